//! The kernel service.
//!
//! Wraps one [`ExecutionContext`] behind a mutex so execution, reset,
//! variable listing and working-directory changes are serialized. Interrupt
//! requests bypass the lock.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::KernelConfig;
use crate::context::{ExecutionContext, InterruptHandle};
use crate::dispatch::dispatch;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::magic::MagicRegistry;
use crate::namespace::{self, Variable};
use crate::payload::ResultPayload;

/// A single-context execution kernel.
pub struct Kernel {
    context: Mutex<ExecutionContext>,
    registry: MagicRegistry,
    interrupt: InterruptHandle,
}

impl Kernel {
    /// Create a kernel over `evaluator` with the built-in magics.
    pub fn new(evaluator: Box<dyn Evaluator>, config: KernelConfig) -> Result<Self> {
        let context = ExecutionContext::new(evaluator, config)?;
        Ok(Self::with_registry(context, MagicRegistry::with_builtins()))
    }

    /// Create a kernel from an existing context and registry.
    pub fn with_registry(context: ExecutionContext, registry: MagicRegistry) -> Self {
        let interrupt = context.interrupt_handle();
        Self {
            context: Mutex::new(context),
            registry,
            interrupt,
        }
    }

    /// Create a kernel backed by a Python worker process.
    pub fn python(config: KernelConfig) -> Result<Self> {
        let context = ExecutionContext::python(config)?;
        Ok(Self::with_registry(context, MagicRegistry::with_builtins()))
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionContext> {
        // A panicking handler leaves the context usable.
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one cell.
    pub fn execute(&self, code: &str) -> ResultPayload {
        let mut ctx = self.lock();
        let payload = dispatch(&mut ctx, &self.registry, code);
        tracing::debug!(
            kind = ?payload.kind(),
            execution_count = ctx.execution_count(),
            "cell executed"
        );
        payload
    }

    pub fn execution_count(&self) -> u32 {
        self.lock().execution_count()
    }

    /// User variables, for the editor's variable panel.
    pub fn list_variables(&self) -> Result<Vec<Variable>> {
        let mut ctx = self.lock();
        let bindings = ctx.evaluator().bindings()?;
        Ok(namespace::variables(&bindings))
    }

    /// Replace the namespace and zero the counter.
    pub fn reset(&self) -> Result<()> {
        self.lock().reset()
    }

    /// Ask the running cell to stop. Does not wait for the kernel lock.
    pub fn request_interrupt(&self) {
        tracing::info!("interrupt requested");
        self.interrupt.request();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_requested()
    }

    /// Handle that can interrupt this kernel from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn working_directory(&self) -> PathBuf {
        self.lock().working_directory().to_path_buf()
    }

    /// Change the working directory; `false` if `path` is not a directory.
    pub fn set_working_directory(&self, path: &str) -> bool {
        self.lock().set_working_directory(path)
    }

    pub fn registry(&self) -> &MagicRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("registry", &self.registry)
            .field("interrupted", &self.is_interrupted())
            .finish_non_exhaustive()
    }
}
