//! Core engine for the Quill notebook kernel.
//!
//! This crate provides:
//! - Cell dispatch (shell escapes, line/cell magics, plain code)
//! - The magic-command registry and its built-in handlers
//! - Expression-vs-statement classification for auto-display
//! - Output capture and result shaping
//! - The evaluator capability and its Python worker-process implementation
//!
//! # Architecture
//!
//! ```text
//! Kernel (mutex-serialized)
//!     │
//!     └── dispatch(ExecutionContext, MagicRegistry, code)
//!             │
//!             ├── !cmd ─────────► shell::run_shell (timeout, process group kill)
//!             ├── %%name / %name ► MagicRegistry handler ──┐
//!             └── plain code ───► classify ─► capture ◄────┘
//!                                               │
//!                                               └── Evaluator (PythonEvaluator)
//!                                                       │
//!                                                       └── IPC: worker process
//! ```

pub mod capture;
pub mod classify;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod ipc;
pub mod kernel;
pub mod magic;
pub mod namespace;
pub mod payload;
pub mod python;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{Captured, capture, shape_result};
pub use classify::{CodeShape, classify, looks_like_statement};
pub use config::{KernelConfig, Preload};
pub use context::{ExecutionContext, InterruptHandle};
pub use dispatch::{dispatch, run_code};
pub use error::{Error, Result};
pub use eval::{Binding, CapturedStreams, Evaluator, Raised};
pub use ipc::WorkerSignal;
pub use kernel::Kernel;
pub use magic::{MagicCommand, MagicHandler, MagicKind, MagicRegistry};
pub use namespace::Variable;
pub use payload::{Output, OutputKind, ResultPayload};
pub use python::PythonEvaluator;
