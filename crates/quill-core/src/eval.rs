//! The evaluation capability.
//!
//! The kernel never interprets user code itself. Everything that touches the
//! persistent namespace goes through an [`Evaluator`], which owns that
//! namespace. [`crate::PythonEvaluator`] is the shipped implementation; tests
//! substitute a scripted one.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Preload;
use crate::error::Result;
use crate::ipc::WorkerSignal;

/// An exception raised by user code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raised {
    /// Exception type name (e.g. `ZeroDivisionError`).
    pub ename: String,
    /// Exception message.
    pub evalue: String,
    /// Fully formatted trace.
    pub traceback: String,
}

/// Text written to stdout/stderr while streams were redirected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedStreams {
    pub stdout: String,
    pub stderr: String,
}

/// One entry of the namespace, as reported by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Bound name.
    pub name: String,
    /// Type name of the value.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Representation of the value (possibly truncated by the evaluator).
    pub repr: String,
    /// Whether the value is callable.
    #[serde(default)]
    pub callable: bool,
    /// Whether the value is itself a type/class.
    #[serde(default)]
    pub is_type: bool,
    /// `shape` attribute, for array-like values.
    #[serde(default)]
    pub shape: Option<String>,
    /// Length, for sized non-string values.
    #[serde(default)]
    pub len: Option<u64>,
}

/// Runs source text against a persistent namespace.
///
/// Implementations report exceptions raised by user code as
/// [`crate::Error::Evaluation`]; any other error means the evaluator itself
/// failed.
pub trait Evaluator: Send {
    /// Execute a block of statements for their side effects.
    fn run_statements(&mut self, code: &str) -> Result<()>;

    /// Evaluate a single expression.
    ///
    /// Returns the value's textual representation, or `None` for the
    /// empty/none sentinel.
    fn eval_expression(&mut self, expr: &str) -> Result<Option<String>>;

    /// Syntax-only probe: does `line` parse in expression grammar?
    ///
    /// Must not execute anything. Any failure means "no".
    fn is_expression(&mut self, line: &str) -> bool;

    /// Redirect stdout/stderr into fresh in-memory buffers.
    fn begin_capture(&mut self) -> Result<()>;

    /// Restore the previous stream bindings and return what was captured.
    fn end_capture(&mut self) -> Result<CapturedStreams>;

    /// Take pending graphical output as PNG bytes, clearing it.
    fn take_pending_plot(&mut self) -> Result<Option<Vec<u8>>>;

    /// Run file contents in a fresh namespace, then merge every non-dunder
    /// binding into the persistent namespace.
    fn run_isolated(&mut self, code: &str, filename: &str) -> Result<()>;

    /// Run `code` `number` times and report the total elapsed time.
    ///
    /// Assignments made by the timed code do not leak into the namespace.
    fn time_statements(&mut self, code: &str, number: u64) -> Result<Duration>;

    /// Snapshot of the namespace, in insertion order.
    fn bindings(&mut self) -> Result<Vec<Binding>>;

    /// Replace the namespace wholesale with a fresh one.
    fn reset(&mut self, preload: &[Preload]) -> Result<()>;

    /// Change the directory user code resolves relative paths against.
    fn set_working_directory(&mut self, path: &Path) -> Result<()>;

    /// Set an environment variable visible to user code.
    fn set_env(&mut self, key: &str, value: &str) -> Result<()>;

    /// Handle for interrupting a running evaluation from another thread.
    fn interrupter(&self) -> Option<WorkerSignal> {
        None
    }
}
