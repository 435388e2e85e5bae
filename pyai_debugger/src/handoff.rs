//! Handoff artifact for the external repair agent.
//!
//! One JSON document per invocation, written next to the input script. It bundles
//! the verdict with everything the agent needs to propose the next revision: which
//! lines were rewritten or skipped, which imports are missing and the optional
//! context text supplied by the caller.

use crate::budget::MemoryBudget;
use crate::error::DebuggerError;
use crate::rewrite::{RewriteRecord, RewriteSkip, SandboxFile, write_atomic};
use crate::runner::RunStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct Handoff {
    pub created_at: DateTime<Utc>,
    pub input: PathBuf,
    pub rewritten_script: PathBuf,
    pub verdict_path: PathBuf,
    pub verdict: String,
    pub passed: bool,
    pub ai_only: bool,
    /// `None` when the sandbox stage did not run
    pub status: Option<RunStatus>,
    pub budget: Option<MemoryBudget>,
    pub context: Option<String>,
    pub unresolved_imports: Vec<String>,
    pub rewrites: Vec<RewriteRecord>,
    pub skipped: Vec<RewriteSkip>,
    pub sandbox_files: Vec<SandboxFile>,
}

impl Handoff {
    pub fn write(&self, path: &Path) -> Result<(), DebuggerError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DebuggerError::SandboxSetup(format!("handoff serialization failed: {e}")))?;
        write_atomic(path, &json)
    }
}
