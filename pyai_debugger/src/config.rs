//! # Debugger Configuration
//!
//! Every tunable of the pipeline lives in [`DebuggerConfig`] and is passed explicitly
//! to each component. Nothing in the crate reads module-level paths or constants at
//! run time.
//!
//! ## Resolution order
//!
//! 1. Built-in defaults (`Default` impls below).
//! 2. An optional TOML file (`--config <path>`). Missing keys keep their defaults.
//! 3. Environment overrides: `PYAI_SANDBOX_ROOT`, `PYAI_PYTHON`, `PYAI_TIMEOUT_SECS`.
//! 4. Command-line flags, applied by the shell module.
//!
//! ## Example file
//!
//! ```toml
//! sandbox_root = "/srv/pyai/sandbox"
//! interpreter = "python3.12"
//! timeout_secs = 20
//!
//! [convergence]
//! stable_polls = 8
//! ```

use crate::error::DebuggerError;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Directory every virtualized path is redirected into
    pub sandbox_root: PathBuf,
    /// Interpreter used for the sandbox run and the import probe
    pub interpreter: String,
    /// Wall-clock bound for one sandbox run
    pub timeout_secs: u64,
    /// Memory watcher sampling interval
    pub poll_interval_ms: u64,
    /// Lower bound of the memory budget, in MB
    pub memory_floor_mb: f64,
    /// Fraction of the budget above which memory diagnostics are attached
    pub diagnostic_ratio: f64,
    /// How many allocation sites to report
    pub top_allocations: usize,
    /// Run the child under the allocation-tracing bootstrap
    pub trace_allocations: bool,
    /// Where the import audit writes its report. Relative paths resolve against the
    /// process working directory.
    pub imports_report: PathBuf,
    /// File names of the per-invocation artifacts written next to the input
    pub script_name: String,
    pub verdict_name: String,
    pub handoff_name: String,
    pub convergence: ConvergenceConfig,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("/home/user/sig"),
            interpreter: "python3".to_string(),
            timeout_secs: 10,
            poll_interval_ms: 100,
            memory_floor_mb: 1024.0,
            diagnostic_ratio: 0.9,
            top_allocations: 10,
            trace_allocations: true,
            imports_report: PathBuf::from("imports.txt"),
            script_name: "new_script.py".to_string(),
            verdict_name: "codetest.txt".to_string(),
            handoff_name: "handoff.json".to_string(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl DebuggerConfig {
    /// Load from an optional TOML file and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, DebuggerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DebuggerError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DebuggerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| DebuggerError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply `PYAI_*` overrides. The lookup is injected so tests never touch the
    /// process environment.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DebuggerError> {
        if let Some(root) = lookup("PYAI_SANDBOX_ROOT").filter(|v| !v.trim().is_empty()) {
            self.sandbox_root = PathBuf::from(root.trim());
        }
        if let Some(python) = lookup("PYAI_PYTHON").filter(|v| !v.trim().is_empty()) {
            self.interpreter = python.trim().to_string();
        }
        if let Some(secs) = lookup("PYAI_TIMEOUT_SECS") {
            self.timeout_secs = secs.trim().parse().map_err(|_| {
                DebuggerError::Config(format!("PYAI_TIMEOUT_SECS is not a number: {secs:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DebuggerError> {
        if !self.sandbox_root.is_absolute() {
            return Err(DebuggerError::Config(format!(
                "sandbox_root must be absolute, got {}",
                self.sandbox_root.display()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DebuggerError::Config("timeout_secs must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(DebuggerError::Config(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if !(self.memory_floor_mb.is_finite() && self.memory_floor_mb > 0.0) {
            return Err(DebuggerError::Config(
                "memory_floor_mb must be a positive number".into(),
            ));
        }
        if !(self.diagnostic_ratio.is_finite() && self.diagnostic_ratio > 0.0) {
            return Err(DebuggerError::Config(
                "diagnostic_ratio must be a positive number".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for waiting on an external agent's output file.
///
/// "No visible change for `stable_polls` reads" approximates "the agent is done";
/// it is not a guarantee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConvergenceConfig {
    pub initial_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub stable_polls: u32,
    pub max_wait_secs: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            initial_wait_ms: 9_000,
            poll_interval_ms: 200,
            stable_polls: 16,
            max_wait_secs: 300,
        }
    }
}

impl ConvergenceConfig {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}
