//! Worker process management for Quill cell execution.
//!
//! Provides `WorkerHandle` for spawning and talking to the persistent Python
//! worker, and `WorkerSignal` for interrupting it from another thread.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};

use super::protocol::{WorkerCommand, WorkerResponse, read_message, write_message};

/// Python source run by the worker (`python -u -c BOOTSTRAP`).
pub const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Handle to a worker process.
///
/// Provides methods to send commands, receive responses, and kill the process.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<std::process::ChildStdin>,
    /// Buffered stdout reader.
    stdout: BufReader<std::process::ChildStdout>,
    /// Shared with every `WorkerSignal` handed out for this worker.
    signal: WorkerSignal,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process.
    ///
    /// The child gets exactly `env` as its environment (plus `MPLBACKEND`),
    /// starts in `cwd`, and must answer a ping before the handle is returned.
    pub fn spawn(
        python: &Path,
        cwd: &Path,
        env: &BTreeMap<String, String>,
        signal: WorkerSignal,
    ) -> Result<Self> {
        let mut child = Command::new(python)
            .arg("-u")
            .arg("-c")
            .arg(BOOTSTRAP)
            .env_clear()
            .envs(env)
            .env("MPLBACKEND", "Agg")
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Worker(format!(
                    "Failed to spawn worker process '{}': {}",
                    python.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        signal.attach(child.id());

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            signal,
            killed: false,
        };

        match handle.request(&WorkerCommand::Ping)? {
            WorkerResponse::Pong => {
                tracing::info!(pid = handle.pid(), python = %python.display(), "worker started");
                Ok(handle)
            }
            other => Err(Error::Ipc(format!(
                "Unexpected response from worker: {:?}",
                other
            ))),
        }
    }

    /// Send a command to the worker.
    pub fn send_command(&mut self, cmd: &WorkerCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        write_message(&mut self.stdin, cmd)
    }

    /// Receive a response from the worker.
    pub fn recv_response(&mut self) -> Result<WorkerResponse> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        read_message(&mut self.stdout)
    }

    /// Send a command and block until its response arrives.
    ///
    /// The worker is marked busy for the duration, so interrupts raised
    /// meanwhile reach it.
    pub fn request(&mut self, cmd: &WorkerCommand) -> Result<WorkerResponse> {
        self.send_command(cmd)?;
        self.signal.busy.store(true, Ordering::SeqCst);
        let response = self.recv_response();
        self.signal.busy.store(false, Ordering::SeqCst);
        response
    }

    /// Kill the worker process immediately.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.killed = true;
        self.signal.detach();

        // Try graceful shutdown first
        let _ = self.send_command_unchecked(&WorkerCommand::Shutdown);
        std::thread::sleep(Duration::from_millis(10));

        if let Err(e) = self.child.kill()
            && e.kind() != std::io::ErrorKind::InvalidInput
        {
            tracing::warn!("Failed to kill worker: {}", e);
        }

        // Reap the zombie
        let _ = self.child.wait();

        Ok(())
    }

    fn send_command_unchecked(&mut self, cmd: &WorkerCommand) -> Result<()> {
        write_message(&mut self.stdin, cmd)
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.kill();
    }
}

/// Thread-safe handle for interrupting a worker from another thread.
///
/// Survives worker respawns: the handle follows whichever process is
/// currently attached.
#[derive(Clone, Default)]
pub struct WorkerSignal {
    /// Process ID of the attached worker (0 when none).
    pid: Arc<AtomicU32>,
    /// Whether a request is in flight.
    busy: Arc<AtomicBool>,
}

impl WorkerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, pid: u32) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.pid.store(0, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Whether the attached worker is currently running a request.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Deliver SIGINT to the worker if it is running something.
    ///
    /// Returns whether a signal was sent. Idle workers are left alone.
    pub fn interrupt(&self) -> bool {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid == 0 || !self.is_busy() {
            return false;
        }

        #[cfg(unix)]
        {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
            if rc != 0 {
                tracing::warn!(pid, "failed to signal worker");
                return false;
            }
            tracing::debug!(pid, "sent SIGINT to worker");
            true
        }

        #[cfg(not(unix))]
        {
            tracing::debug!(pid, "worker interrupts are not supported on this platform");
            false
        }
    }
}

impl std::fmt::Debug for WorkerSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSignal")
            .field("pid", &self.pid.load(Ordering::SeqCst))
            .field("busy", &self.is_busy())
            .finish()
    }
}
