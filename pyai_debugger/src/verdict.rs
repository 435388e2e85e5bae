//! The verdict artifact: `PASS\n`, or a fenced block of left-stripped diagnostics.

use crate::runner::{ExecutionResult, RunStatus};
use serde::Serialize;

/// Text written to the verdict file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub text: String,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            text: "PASS\n".to_string(),
        }
    }

    /// A failure verdict. Each diagnostic line loses its leading whitespace; a
    /// trailing newline shows up as an empty last line inside the fence.
    pub fn error(diagnostics: &str) -> Self {
        let body: Vec<&str> = diagnostics.split('\n').map(str::trim_start).collect();
        Self {
            passed: false,
            text: format!("Error:\n```\n{}\n```", body.join("\n")),
        }
    }

    /// Classify a sandbox run.
    ///
    /// A pass carrying memory diagnostics keeps `PASS` as the first fenced line so
    /// the annotation is not lost.
    pub fn from_result(result: &ExecutionResult) -> Self {
        let diagnostics = result.diagnostic_text();
        match result.status {
            RunStatus::Passed if diagnostics.is_empty() => Self::pass(),
            RunStatus::Passed => {
                let mut verdict = Self::error(&format!("PASS\n\n{diagnostics}"));
                verdict.passed = true;
                verdict
            }
            _ => Self::error(&diagnostics),
        }
    }

    /// Verdict when the sandbox stage was skipped on request.
    pub fn not_run() -> Self {
        Self::error("NOT RUN: sandbox bypassed (AI-only mode)")
    }
}
