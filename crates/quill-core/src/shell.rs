//! Child processes with a hard timeout.
//!
//! Used by `!cmd` escapes, `%%bash` cells and `%pip`. Each child runs in its
//! own process group (unix) so a timeout kills everything it started.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra time allowed for pipes to drain after the child exits.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Output of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code, `None` if killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Run `command` through the platform shell (`/bin/sh -c` or `cmd /C`).
pub fn run_shell(
    command: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ShellOutput> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    tracing::debug!(command, cwd = %cwd.display(), "running shell command");
    run(&mut cmd, cwd, env, timeout)
}

/// Run `program` directly with `args`.
pub fn run_program(
    program: &Path,
    args: &[&str],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ShellOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    tracing::debug!(program = %program.display(), ?args, "running program");
    run(&mut cmd, cwd, env, timeout)
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn run(
    cmd: &mut Command,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ShellOutput> {
    cmd.current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Shell(format!("failed to start command: {}", e)))?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, Stream::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, Stream::Stderr, tx);
    }

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill_tree(&mut child);
            tracing::warn!(timeout_secs = timeout.as_secs(), "child process timed out");
            return Err(Error::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    // Background grandchildren may hold the pipes open; don't wait forever.
    let mut output = ShellOutput {
        status: status.code(),
        ..ShellOutput::default()
    };
    for _ in 0..2 {
        match rx.recv_timeout(DRAIN_GRACE) {
            Ok((Stream::Stdout, text)) => output.stdout = text,
            Ok((Stream::Stderr, text)) => output.stderr = text,
            Err(_) => break,
        }
    }

    Ok(output)
}

fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    stream: Stream,
    tx: mpsc::Sender<(Stream, String)>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group; take the whole group down.
        let pgid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }

    if let Err(e) = child.kill()
        && e.kind() != std::io::ErrorKind::InvalidInput
    {
        tracing::warn!("failed to kill child process: {}", e);
    }
    let _ = child.wait();
}
