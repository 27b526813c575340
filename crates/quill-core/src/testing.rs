//! Scripted evaluator for unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{KernelConfig, Preload};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::eval::{Binding, CapturedStreams, Evaluator, Raised};

#[derive(Default)]
struct State {
    executed: Vec<String>,
    evaluated: Vec<String>,
    capture_depth: usize,
    plot: Option<Vec<u8>>,
    bindings: Vec<Binding>,
    loop_time: Duration,
    timed_batches: Vec<u64>,
    resets: usize,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

/// Evaluator that records calls instead of running code.
///
/// - statements starting with `raise` fail with an evaluation error
/// - expressions evaluate to `<expr>`
/// - a line is an expression unless it contains `(`
///
/// Clones share state, so a test can keep one while the context owns
/// another.
#[derive(Clone)]
pub struct RecordingEvaluator {
    state: Arc<Mutex<State>>,
}

impl RecordingEvaluator {
    pub fn new() -> Self {
        let state = State {
            loop_time: Duration::from_micros(10),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.state().evaluated.clone()
    }

    pub fn capture_depth(&self) -> usize {
        self.state().capture_depth
    }

    pub fn queue_plot(&self, png: Vec<u8>) {
        self.state().plot = Some(png);
    }

    pub fn bind(&self, name: &str, type_name: &str, repr: &str) {
        self.state().bindings.push(Binding {
            name: name.to_string(),
            type_name: type_name.to_string(),
            repr: repr.to_string(),
            callable: false,
            is_type: false,
            shape: None,
            len: None,
        });
    }

    pub fn set_loop_time(&self, per_loop: Duration) {
        self.state().loop_time = per_loop;
    }

    pub fn timed_batches(&self) -> Vec<u64> {
        self.state().timed_batches.clone()
    }

    pub fn resets(&self) -> usize {
        self.state().resets
    }

    pub fn working_directory(&self) -> Option<PathBuf> {
        self.state().cwd.clone()
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.state().env.get(key).cloned()
    }
}

impl Evaluator for RecordingEvaluator {
    fn run_statements(&mut self, code: &str) -> Result<()> {
        self.state().executed.push(code.to_string());
        if code.trim_start().starts_with("raise") {
            return Err(Error::Evaluation(Raised {
                ename: "RuntimeError".to_string(),
                evalue: code.to_string(),
                traceback: format!("Traceback (most recent call last):\nRuntimeError: {}", code),
            }));
        }
        Ok(())
    }

    fn eval_expression(&mut self, expr: &str) -> Result<Option<String>> {
        self.state().evaluated.push(expr.to_string());
        Ok(Some(format!("<{}>", expr)))
    }

    fn is_expression(&mut self, line: &str) -> bool {
        !line.contains('(')
    }

    fn begin_capture(&mut self) -> Result<()> {
        self.state().capture_depth += 1;
        Ok(())
    }

    fn end_capture(&mut self) -> Result<CapturedStreams> {
        let mut state = self.state();
        state.capture_depth = state.capture_depth.saturating_sub(1);
        Ok(CapturedStreams::default())
    }

    fn take_pending_plot(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.state().plot.take())
    }

    fn run_isolated(&mut self, code: &str, _filename: &str) -> Result<()> {
        self.run_statements(code)
    }

    fn time_statements(&mut self, _code: &str, number: u64) -> Result<Duration> {
        let mut state = self.state();
        state.timed_batches.push(number);
        Ok(state.loop_time * number as u32)
    }

    fn bindings(&mut self) -> Result<Vec<Binding>> {
        Ok(self.state().bindings.clone())
    }

    fn reset(&mut self, _preload: &[Preload]) -> Result<()> {
        let mut state = self.state();
        state.resets += 1;
        state.bindings.clear();
        Ok(())
    }

    fn set_working_directory(&mut self, path: &Path) -> Result<()> {
        self.state().cwd = Some(path.to_path_buf());
        Ok(())
    }

    fn set_env(&mut self, key: &str, value: &str) -> Result<()> {
        self.state().env.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A context over a [`RecordingEvaluator`] rooted at `dir`.
pub fn test_context(dir: &Path) -> (ExecutionContext, RecordingEvaluator) {
    test_context_with(KernelConfig::default().with_working_directory(dir))
}

pub fn test_context_with(config: KernelConfig) -> (ExecutionContext, RecordingEvaluator) {
    let evaluator = RecordingEvaluator::new();
    let ctx = ExecutionContext::new(Box::new(evaluator.clone()), config).unwrap();
    (ctx, evaluator)
}
