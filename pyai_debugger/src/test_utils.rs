//! Test helper utilities for the debugger.
//!
//! Sandbox runs need a real Python interpreter. Tests that spawn one call
//! [`skip_if_no_python!`](crate::skip_if_no_python) first so they pass (with a
//! notice) on machines without Python.

use crate::config::DebuggerConfig;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Interpreter used by tests: `PYAI_PYTHON` if set, otherwise `python3`.
pub fn python_interpreter() -> String {
    std::env::var("PYAI_PYTHON")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "python3".to_string())
}

/// Whether the test interpreter can be started. Probed once per test binary.
pub fn python_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        std::process::Command::new(python_interpreter())
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

/// Skip the current test when no Python interpreter is available.
#[macro_export]
macro_rules! skip_if_no_python {
    () => {
        if !$crate::test_utils::python_available() {
            eprintln!("⚠️  Skipping test - no Python interpreter available");
            return;
        }
    };
}

/// A configuration that keeps every artifact inside `dir`.
pub fn scratch_config(dir: &Path) -> DebuggerConfig {
    DebuggerConfig {
        sandbox_root: dir.join("sig"),
        imports_report: dir.join("imports.txt"),
        interpreter: python_interpreter(),
        ..DebuggerConfig::default()
    }
}

/// Write `body` to `dir/name` and return the path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("Failed to write test script");
    path
}

