//! [`Evaluator`] backed by a persistent Python worker process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::config::{KernelConfig, Preload};
use crate::error::{Error, Result};
use crate::eval::{Binding, CapturedStreams, Evaluator, Raised};
use crate::ipc::{WorkerCommand, WorkerHandle, WorkerResponse, WorkerSignal};

/// Runs cells in a long-lived `python` child process.
///
/// The worker is spawned lazily and respawned after it dies; a respawned
/// worker starts from a fresh namespace with the configured preloads, the
/// current working directory and the current environment table.
pub struct PythonEvaluator {
    python: PathBuf,
    worker: Option<WorkerHandle>,
    signal: WorkerSignal,
    preload: Vec<Preload>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl PythonEvaluator {
    /// Create an evaluator for the interpreter named by `config`.
    ///
    /// Fails if no interpreter can be found. The worker itself starts on
    /// first use.
    pub fn new(config: &KernelConfig) -> Result<Self> {
        Ok(Self {
            python: config.python_executable()?,
            worker: None,
            signal: WorkerSignal::new(),
            preload: config.preload.clone(),
            cwd: config.working_directory.clone(),
            env: std::env::vars().collect(),
        })
    }

    /// Interpreter the worker runs under.
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Spawn the worker now instead of on first use.
    pub fn start(&mut self) -> Result<()> {
        self.worker().map(|_| ())
    }

    fn worker(&mut self) -> Result<&mut WorkerHandle> {
        let alive = match self.worker.as_mut() {
            Some(worker) => worker.is_alive(),
            None => false,
        };

        if !alive {
            if self.worker.take().is_some() {
                tracing::warn!("worker process exited; respawning with a fresh namespace");
            }
            let mut worker =
                WorkerHandle::spawn(&self.python, &self.cwd, &self.env, self.signal.clone())?;
            match worker.request(&WorkerCommand::Reset {
                preload: self.preload.clone(),
            })? {
                WorkerResponse::Done => {}
                other => return Err(unexpected(other)),
            }
            self.worker = Some(worker);
        }

        self.worker
            .as_mut()
            .ok_or_else(|| Error::Worker("worker unavailable".to_string()))
    }

    /// Send one command, turning raised exceptions and protocol failures
    /// into errors.
    ///
    /// A broken channel kills the worker so the next call starts a new one.
    fn call(&mut self, cmd: WorkerCommand) -> Result<WorkerResponse> {
        let response = self.worker()?.request(&cmd);
        match response {
            Ok(WorkerResponse::Raised {
                ename,
                evalue,
                traceback,
            }) => Err(Error::Evaluation(Raised {
                ename,
                evalue,
                traceback,
            })),
            Ok(WorkerResponse::Failed { message }) => Err(Error::Worker(message)),
            Ok(other) => Ok(other),
            Err(e) => {
                tracing::warn!("lost contact with worker: {}", e);
                if let Some(mut worker) = self.worker.take() {
                    let _ = worker.kill();
                }
                Err(Error::Worker(
                    "kernel worker exited unexpectedly; the namespace was lost".to_string(),
                ))
            }
        }
    }

    fn call_done(&mut self, cmd: WorkerCommand) -> Result<()> {
        match self.call(cmd)? {
            WorkerResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: WorkerResponse) -> Error {
    Error::Ipc(format!("Unexpected response from worker: {:?}", response))
}

impl Evaluator for PythonEvaluator {
    fn run_statements(&mut self, code: &str) -> Result<()> {
        self.call_done(WorkerCommand::Exec {
            code: code.to_string(),
        })
    }

    fn eval_expression(&mut self, expr: &str) -> Result<Option<String>> {
        match self.call(WorkerCommand::Eval {
            code: expr.to_string(),
        })? {
            WorkerResponse::Value { repr } => Ok(repr),
            other => Err(unexpected(other)),
        }
    }

    fn is_expression(&mut self, line: &str) -> bool {
        matches!(
            self.call(WorkerCommand::Probe {
                code: line.to_string(),
            }),
            Ok(WorkerResponse::Probe { expression: true })
        )
    }

    fn begin_capture(&mut self) -> Result<()> {
        self.call_done(WorkerCommand::CaptureBegin)
    }

    fn end_capture(&mut self) -> Result<CapturedStreams> {
        match self.call(WorkerCommand::CaptureEnd)? {
            WorkerResponse::Streams { stdout, stderr } => Ok(CapturedStreams { stdout, stderr }),
            other => Err(unexpected(other)),
        }
    }

    fn take_pending_plot(&mut self) -> Result<Option<Vec<u8>>> {
        match self.call(WorkerCommand::Plot)? {
            WorkerResponse::Plot { png: None } => Ok(None),
            WorkerResponse::Plot { png: Some(encoded) } => BASE64
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| Error::Serialization(format!("invalid plot data: {}", e))),
            other => Err(unexpected(other)),
        }
    }

    fn run_isolated(&mut self, code: &str, filename: &str) -> Result<()> {
        self.call_done(WorkerCommand::RunFile {
            code: code.to_string(),
            path: filename.to_string(),
        })
    }

    fn time_statements(&mut self, code: &str, number: u64) -> Result<Duration> {
        match self.call(WorkerCommand::Time {
            code: code.to_string(),
            number,
        })? {
            WorkerResponse::Timing { seconds } => Ok(Duration::from_secs_f64(seconds.max(0.0))),
            other => Err(unexpected(other)),
        }
    }

    fn bindings(&mut self) -> Result<Vec<Binding>> {
        match self.call(WorkerCommand::Bindings)? {
            WorkerResponse::Bindings { bindings } => Ok(bindings),
            other => Err(unexpected(other)),
        }
    }

    fn reset(&mut self, preload: &[Preload]) -> Result<()> {
        self.preload = preload.to_vec();
        self.call_done(WorkerCommand::Reset {
            preload: self.preload.clone(),
        })
    }

    fn set_working_directory(&mut self, path: &Path) -> Result<()> {
        self.cwd = path.to_path_buf();
        if self.worker.is_none() {
            return Ok(());
        }
        self.call_done(WorkerCommand::Chdir {
            path: path.to_string_lossy().into_owned(),
        })
    }

    fn set_env(&mut self, key: &str, value: &str) -> Result<()> {
        self.env.insert(key.to_string(), value.to_string());
        if self.worker.is_none() {
            return Ok(());
        }
        self.call_done(WorkerCommand::Setenv {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn interrupter(&self) -> Option<WorkerSignal> {
        Some(self.signal.clone())
    }
}

impl std::fmt::Debug for PythonEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonEvaluator")
            .field("python", &self.python)
            .field("running", &self.worker.is_some())
            .field("cwd", &self.cwd)
            .finish()
    }
}
