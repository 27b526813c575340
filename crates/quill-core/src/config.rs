//! Kernel configuration.
//!
//! Defaults mirror the behavior expected by the notebook editor; every
//! field can be overridden programmatically, and [`KernelConfig::from_env`]
//! picks up the `QUILL_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timeout for `!cmd` escapes and `%%bash` cells.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `%pip` / `!pip` invocations.
pub const PIP_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable naming the Python interpreter to use.
pub const PYTHON_ENV: &str = "QUILL_PYTHON";

/// Environment variable naming the initial working directory.
pub const WORKING_DIR_ENV: &str = "QUILL_WORKING_DIR";

/// A module imported into every fresh namespace under an alias.
///
/// Imports are best-effort: a missing module is skipped silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preload {
    /// Name bound in the namespace (e.g. `np`).
    pub alias: String,
    /// Module to import (e.g. `numpy`).
    pub module: String,
}

impl Preload {
    pub fn new(alias: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            module: module.into(),
        }
    }
}

/// Configuration for an execution kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Explicit interpreter path. Discovered from the environment when `None`.
    pub python: Option<PathBuf>,

    /// Initial working directory. Created if missing.
    pub working_directory: PathBuf,

    /// Modules pre-imported into each fresh namespace.
    pub preload: Vec<Preload>,

    /// Timeout for shell escapes and shell cell magics.
    pub shell_timeout: Duration,

    /// Timeout for package installs.
    pub pip_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            python: None,
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            preload: vec![Preload::new("np", "numpy"), Preload::new("pd", "pandas")],
            shell_timeout: SHELL_TIMEOUT,
            pip_timeout: PIP_TIMEOUT,
        }
    }
}

impl KernelConfig {
    /// Build a configuration from defaults plus `QUILL_PYTHON` and
    /// `QUILL_WORKING_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(python) = std::env::var_os(PYTHON_ENV) {
            config.python = Some(PathBuf::from(python));
        }
        if let Some(dir) = std::env::var_os(WORKING_DIR_ENV) {
            config.working_directory = PathBuf::from(dir);
        }
        config
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    pub fn with_preload(mut self, preload: Vec<Preload>) -> Self {
        self.preload = preload;
        self
    }

    /// Locate the Python interpreter.
    ///
    /// Looks in the following order:
    /// 1. The explicit `python` field
    /// 2. `QUILL_PYTHON` environment variable
    /// 3. `python3` on the system PATH
    /// 4. `python` on the system PATH
    pub fn python_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.python {
            return Ok(path.clone());
        }

        if let Some(path) = std::env::var_os(PYTHON_ENV) {
            return Ok(PathBuf::from(path));
        }

        for name in ["python3", "python"] {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }

        Err(Error::Worker(format!(
            "could not find a Python interpreter. Set {} or ensure python3 is in PATH.",
            PYTHON_ENV
        )))
    }
}
