//! Execution context for Quill cells.
//!
//! Holds everything a dispatch mutates: the evaluator (and through it the
//! persistent namespace), the execution counter, the interrupt flag, the
//! working directory and the kernel's environment table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::KernelConfig;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::ipc::WorkerSignal;
use crate::python::PythonEvaluator;

/// Handle for interrupting execution.
///
/// Clones share one flag. Requesting an interrupt sets the flag and, when
/// the evaluator is a worker process that is running something, signals it.
///
/// # Example
///
/// ```
/// use quill_core::InterruptHandle;
///
/// let handle = InterruptHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_requested());
/// handle_clone.request();
/// assert!(handle.is_requested());
/// ```
#[derive(Clone, Default, Debug)]
pub struct InterruptHandle {
    /// Shared interrupt flag.
    requested: Arc<AtomicBool>,
    /// Worker to signal, if the evaluator supports it.
    signal: Option<WorkerSignal>,
}

impl InterruptHandle {
    /// Create a handle that only carries the flag.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_signal(signal: Option<WorkerSignal>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            signal,
        }
    }

    /// Check if an interrupt has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request an interrupt.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(signal) = &self.signal {
            signal.interrupt();
        }
    }

    /// Clear the flag. Called at the start of every dispatch.
    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Persistent state shared by every cell of one kernel.
pub struct ExecutionContext {
    evaluator: Box<dyn Evaluator>,
    execution_count: u32,
    interrupt: InterruptHandle,
    working_directory: PathBuf,
    env: BTreeMap<String, String>,
    config: KernelConfig,
    generation: u64,
}

/// Create `dir` if missing and return its canonical form.
fn prepare_working_directory(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .and_then(|()| dir.canonicalize())
        .map_err(|e| {
            Error::InvalidArgument(format!("working directory {}: {}", dir.display(), e))
        })
}

impl ExecutionContext {
    /// Create a context around an evaluator.
    ///
    /// The configured working directory is created if missing and handed to
    /// the evaluator.
    pub fn new(mut evaluator: Box<dyn Evaluator>, config: KernelConfig) -> Result<Self> {
        let working_directory = prepare_working_directory(&config.working_directory)?;
        evaluator.set_working_directory(&working_directory)?;

        let interrupt = InterruptHandle::with_signal(evaluator.interrupter());

        Ok(Self {
            evaluator,
            execution_count: 0,
            interrupt,
            working_directory,
            env: std::env::vars().collect(),
            config,
            generation: 0,
        })
    }

    /// Create a context backed by a Python worker process.
    ///
    /// The working directory is created before the worker starts in it.
    pub fn python(mut config: KernelConfig) -> Result<Self> {
        config.working_directory = prepare_working_directory(&config.working_directory)?;
        let mut evaluator = PythonEvaluator::new(&config)?;
        evaluator.start()?;
        Self::new(Box::new(evaluator), config)
    }

    pub fn evaluator(&mut self) -> &mut dyn Evaluator {
        self.evaluator.as_mut()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    pub(crate) fn bump_execution_count(&mut self) {
        self.execution_count += 1;
    }

    /// Changes each time the namespace is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_requested()
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Change the working directory.
    ///
    /// Returns `false`, leaving the directory unchanged, if `path` does not
    /// resolve to an existing directory.
    pub fn set_working_directory(&mut self, path: &str) -> bool {
        let target = self.resolve_path(path);
        let Ok(target) = target.canonicalize() else {
            return false;
        };
        if !target.is_dir() {
            return false;
        }

        if let Err(e) = self.evaluator.set_working_directory(&target) {
            tracing::warn!("evaluator rejected working directory: {}", e);
            return false;
        }
        tracing::debug!(cwd = %target.display(), "working directory changed");
        self.working_directory = target;
        true
    }

    /// Resolve a user-supplied path: `~` expands to the home directory and
    /// relative paths are taken against the working directory.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let expanded = match raw.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
                match dirs::home_dir() {
                    Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                    None => PathBuf::from(raw),
                }
            }
            _ => PathBuf::from(raw),
        };

        if expanded.is_absolute() {
            expanded
        } else {
            self.working_directory.join(expanded)
        }
    }

    /// Environment passed to shell-outs and visible to user code.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn set_env_var(&mut self, key: &str, value: &str) -> Result<()> {
        self.evaluator.set_env(key, value)?;
        self.env.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replace the namespace and zero the counter and interrupt flag.
    ///
    /// Counter and flag are zeroed even if the evaluator fails.
    pub fn reset(&mut self) -> Result<()> {
        self.execution_count = 0;
        self.interrupt.clear();
        self.generation += 1;
        tracing::debug!("namespace reset");
        self.evaluator.reset(&self.config.preload)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_count", &self.execution_count)
            .field("working_directory", &self.working_directory)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_interrupt_handle_shared() {
        let handle = InterruptHandle::new();
        let clone = handle.clone();
        clone.request();
        assert!(handle.is_requested());
        handle.clear();
        assert!(!clone.is_requested());
    }

    #[test]
    fn test_new_creates_working_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("nested/work");
        let (ctx, _) = test_context(&dir);
        assert!(dir.is_dir());
        assert_eq!(ctx.working_directory(), dir.canonicalize().unwrap());
    }

    #[test]
    fn test_unusable_working_directory_names_the_path() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("file"), "x").unwrap();
        let config = KernelConfig::default().with_working_directory(temp.path().join("file/sub"));

        let err = ExecutionContext::new(Box::new(crate::testing::RecordingEvaluator::new()), config)
            .unwrap_err();
        assert!(err.to_string().contains("working directory"));
        assert!(err.to_string().contains("file/sub"));
    }

    #[test]
    fn test_relative_cd() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        let (mut ctx, _) = test_context(temp.path());

        assert!(ctx.set_working_directory("sub"));
        assert!(ctx.working_directory().ends_with("sub"));
        assert!(ctx.set_working_directory(".."));
        assert_eq!(ctx.working_directory(), temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_cd_to_file_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("f.txt"), "x").unwrap();
        let (mut ctx, _) = test_context(temp.path());
        let before = ctx.working_directory().to_path_buf();

        assert!(!ctx.set_working_directory("f.txt"));
        assert_eq!(ctx.working_directory(), before);
    }

    #[test]
    fn test_resolve_home() {
        let temp = tempfile::TempDir::new().unwrap();
        let (ctx, _) = test_context(temp.path());
        if let Some(home) = dirs::home_dir() {
            assert_eq!(ctx.resolve_path("~"), home);
            assert_eq!(ctx.resolve_path("~/notes"), home.join("notes"));
        }
        assert_eq!(ctx.resolve_path("~user"), ctx.working_directory().join("~user"));
    }

    #[test]
    fn test_env_var_roundtrip() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut ctx, record) = test_context(temp.path());
        ctx.set_env_var("QUILL_TEST_FLAG", "on").unwrap();
        assert_eq!(ctx.env_var("QUILL_TEST_FLAG"), Some("on"));
        assert_eq!(
            record.env("QUILL_TEST_FLAG").as_deref(),
            Some("on")
        );
        // The kernel process itself is untouched.
        assert!(std::env::var("QUILL_TEST_FLAG").is_err());
    }

    #[test]
    fn test_reset_zeroes_counter() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut ctx, _) = test_context(temp.path());
        ctx.bump_execution_count();
        ctx.interrupt_handle().request();
        let generation = ctx.generation();

        ctx.reset().unwrap();
        assert_eq!(ctx.execution_count(), 0);
        assert!(!ctx.is_interrupted());
        assert_ne!(ctx.generation(), generation);
    }
}
