//! # Import Audit
//!
//! Lists the top-level packages a script imports that the interpreter cannot find.
//! The result is written as a single `", "`-joined line so the repair agent knows
//! which dependencies are missing before it reads any traceback.
//!
//! Only unindented `import` and `from ... import` statements are considered.
//! Relative imports and `__future__` are ignored.

use crate::error::DebuggerError;
use crate::rewrite::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

const PROBE_SOURCE: &str = r#"
import importlib.util
import sys

sys.path.insert(0, sys.argv[1])
for name in sys.argv[2:]:
    if name in sys.builtin_module_names:
        continue
    try:
        found = importlib.util.find_spec(name) is not None
    except Exception:
        found = False
    if not found:
        print(name)
"#;

/// Decides which top-level module names are missing.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Return the subset of `names` that cannot be imported, in input order.
    async fn unresolved(&self, names: &[String], script_dir: &Path) -> Result<Vec<String>, DebuggerError>;
}

/// Asks a Python interpreter, with the script's directory first on `sys.path`.
#[derive(Debug, Clone)]
pub struct PythonModuleResolver {
    interpreter: String,
}

impl PythonModuleResolver {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl ModuleResolver for PythonModuleResolver {
    async fn unresolved(&self, names: &[String], script_dir: &Path) -> Result<Vec<String>, DebuggerError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(PROBE_SOURCE)
            .arg(script_dir)
            .args(names)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        if script_dir.is_dir() {
            command.current_dir(script_dir);
        }

        let output = match tokio::time::timeout(PROBE_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(DebuggerError::InterpreterUnavailable(self.interpreter.clone()));
            }
            Ok(Err(source)) => {
                return Err(DebuggerError::Spawn {
                    program: self.interpreter.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(DebuggerError::SandboxSetup(format!(
                    "import probe did not finish within {}s",
                    PROBE_TIMEOUT.as_secs()
                )));
            }
        };
        if !output.status.success() {
            return Err(DebuggerError::SandboxSetup(format!(
                "import probe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let missing: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(names
            .iter()
            .filter(|n| missing.contains(n))
            .cloned()
            .collect())
    }
}

/// Top-level package names imported by unindented statements, first occurrence kept.
pub fn top_level_imports(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |module: &str| {
        let top = module.trim().split('.').next().unwrap_or_default().trim();
        let valid = !top.is_empty()
            && top != "__future__"
            && top.chars().all(|c| c.is_alphanumeric() || c == '_');
        if valid && !names.iter().any(|n| n == top) {
            names.push(top.to_string());
        }
    };

    for line in text.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let code = line.split('#').next().unwrap_or_default();
        if let Some(rest) = code.strip_prefix("import ") {
            for item in rest.split(',') {
                let module = item.split(" as ").next().unwrap_or_default();
                push(module);
            }
        } else if let Some(rest) = code.strip_prefix("from ") {
            let module = rest.trim_start();
            if module.starts_with('.') {
                continue;
            }
            let module = module.split_whitespace().next().unwrap_or_default();
            push(module);
        }
    }
    names
}

/// Result of auditing one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub candidates: Vec<String>,
    pub unresolved: Vec<String>,
}

impl ImportReport {
    /// The report line: unresolved names joined by `", "`.
    pub fn render(&self) -> String {
        self.unresolved.join(", ")
    }
}

/// Audits scripts with a [`ModuleResolver`] and writes the report artifact.
pub struct ImportAuditor<R> {
    resolver: R,
    report_path: PathBuf,
}

impl<R: ModuleResolver> ImportAuditor<R> {
    pub fn new(resolver: R, report_path: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            report_path: report_path.into(),
        }
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Audit `text` and return the report without writing anything.
    ///
    /// A resolver failure is not fatal: every candidate is then reported.
    pub async fn audit(&self, text: &str, script_dir: &Path) -> ImportReport {
        let candidates = top_level_imports(text);
        let unresolved = match self.resolver.unresolved(&candidates, script_dir).await {
            Ok(unresolved) => unresolved,
            Err(e) => {
                tracing::warn!(error = %e, "Import probe failed, reporting every import as unresolved");
                candidates.clone()
            }
        };
        ImportReport {
            candidates,
            unresolved,
        }
    }

    /// Audit `text` and overwrite the report artifact.
    pub async fn audit_and_write(&self, text: &str, script_dir: &Path) -> Result<ImportReport, DebuggerError> {
        let report = self.audit(text, script_dir).await;
        write_atomic(&self.report_path, &report.render())?;
        tracing::debug!(
            path = %self.report_path.display(),
            unresolved = report.unresolved.len(),
            "Wrote import report"
        );
        Ok(report)
    }
}
