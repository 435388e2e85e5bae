use pyai_common::run_state::Terminal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;

use super::watcher::WatcherOutcome;

const MB: f64 = 1024.0 * 1024.0;

/// Outcome classes of a sandbox run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Passed,
    Failed,
    Timeout,
    MemoryKilled,
    Error,
}

impl RunStatus {
    pub fn is_pass(self) -> bool {
        self == RunStatus::Passed
    }
}

impl From<RunStatus> for Terminal {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Passed => Terminal::Passed,
            RunStatus::Failed => Terminal::Failed,
            RunStatus::Timeout => Terminal::TimedOut,
            RunStatus::MemoryKilled => Terminal::MemoryKilled,
            RunStatus::Error => Terminal::Errored,
        }
    }
}

/// One `file:line` allocation site from the child's tracer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSite {
    pub file: String,
    pub line: u32,
    pub size: u64,
    pub count: u64,
}

impl std::fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: size={:.1} KiB, count={}",
            self.file,
            self.line,
            self.size as f64 / 1024.0,
            self.count
        )
    }
}

/// Where the memory figures came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Report written by the child's allocation tracer at exit
    Tracer,
    /// Highest resident size the watcher sampled
    ResidentSample,
}

/// Memory figures for a finished run, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReport {
    pub current: u64,
    pub peak: u64,
    #[serde(default)]
    pub top: Vec<AllocationSite>,
    pub source: MemorySource,
}

impl MemoryReport {
    pub fn peak_mb(&self) -> f64 {
        self.peak as f64 / MB
    }

    pub fn current_mb(&self) -> f64 {
        self.current as f64 / MB
    }

    fn render(&self, out: &mut String) {
        let _ = write!(
            out,
            "Current memory usage: {:.2}MB; Peak: {:.2}MB",
            self.current_mb(),
            self.peak_mb()
        );
        if !self.top.is_empty() {
            let _ = write!(out, "\n\nTop {} memory usage:", self.top.len());
            for site in &self.top {
                let _ = write!(out, "\n{site}");
            }
        }
    }
}

/// Everything one sandbox run produced. Built once, never modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub threshold_mb: f64,
    pub memory: Option<MemoryReport>,
    /// Set when peak memory went above the diagnostic fraction of the threshold
    pub memory_exceeded: bool,
    pub watcher_started: bool,
    #[serde(skip)]
    pub watcher: Option<WatcherOutcome>,
    /// Setup or execution error text for [`RunStatus::Error`]
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A run that never got going.
    pub fn setup_error(message: impl Into<String>, threshold_mb: f64, elapsed: Duration) -> Self {
        Self {
            status: RunStatus::Error,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            threshold_mb,
            memory: None,
            memory_exceeded: false,
            watcher_started: false,
            watcher: None,
            error: Some(message.into()),
            elapsed,
        }
    }

    /// Diagnostic text for the verdict. Empty for a clean pass.
    pub fn diagnostic_text(&self) -> String {
        let mut out = match self.status {
            RunStatus::Passed => String::new(),
            RunStatus::Failed => self.stderr.clone(),
            RunStatus::Timeout => "TIMEOUT".to_string(),
            RunStatus::MemoryKilled => {
                let resident = match &self.watcher {
                    Some(WatcherOutcome::Killed { resident_mb }) => format!(" at {resident_mb:.2}MB resident"),
                    _ => String::new(),
                };
                format!(
                    "MEMORY LIMIT EXCEEDED: process killed{resident}, threshold {:.2}MB",
                    self.threshold_mb
                )
            }
            RunStatus::Error => format!(
                "DEBUGGING ERROR:\n{}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
        };

        let annotate = self.memory_exceeded || self.status == RunStatus::MemoryKilled;
        if let Some(memory) = self.memory.as_ref().filter(|_| annotate) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            memory.render(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: RunStatus) -> ExecutionResult {
        ExecutionResult {
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            threshold_mb: 1024.0,
            memory: None,
            memory_exceeded: false,
            watcher_started: true,
            watcher: None,
            error: None,
            elapsed: Duration::from_millis(5),
        }
    }

    fn memory() -> MemoryReport {
        MemoryReport {
            current: 512 * 1024 * 1024,
            peak: 1000 * 1024 * 1024,
            top: vec![AllocationSite {
                file: "/tmp/new_script.py".into(),
                line: 4,
                size: 2048,
                count: 3,
            }],
            source: MemorySource::Tracer,
        }
    }

    #[test]
    fn test_clean_pass_has_no_diagnostics() {
        assert_eq!(result(RunStatus::Passed).diagnostic_text(), "");
    }

    #[test]
    fn test_failure_keeps_stderr_verbatim() {
        let mut r = result(RunStatus::Failed);
        r.stderr = "Traceback (most recent call last):\n  File \"x.py\", line 1\nNameError: y\n".into();
        assert_eq!(r.diagnostic_text(), r.stderr);
    }

    #[test]
    fn test_timeout_and_error_texts() {
        assert_eq!(result(RunStatus::Timeout).diagnostic_text(), "TIMEOUT");
        let r = ExecutionResult::setup_error("interpreter missing", 1024.0, Duration::ZERO);
        assert_eq!(r.diagnostic_text(), "DEBUGGING ERROR:\ninterpreter missing");
    }

    #[test]
    fn test_memory_annotation_coexists_with_pass() {
        let mut r = result(RunStatus::Passed);
        r.memory = Some(memory());
        assert_eq!(r.diagnostic_text(), "");

        r.memory_exceeded = true;
        let text = r.diagnostic_text();
        assert!(text.starts_with("Current memory usage: 512.00MB; Peak: 1000.00MB"));
        assert!(text.contains("Top 1 memory usage:\n/tmp/new_script.py:4: size=2.0 KiB, count=3"));
    }

    #[test]
    fn test_memory_kill_mentions_threshold() {
        let mut r = result(RunStatus::MemoryKilled);
        r.watcher = Some(WatcherOutcome::Killed { resident_mb: 1100.5 });
        let text = r.diagnostic_text();
        assert!(text.starts_with("MEMORY LIMIT EXCEEDED: process killed at 1100.50MB resident"));
        assert!(text.contains("threshold 1024.00MB"));
    }

    #[test]
    fn test_status_maps_to_terminal() {
        assert_eq!(Terminal::from(RunStatus::Timeout), Terminal::TimedOut);
        assert_eq!(Terminal::from(RunStatus::Error), Terminal::Errored);
    }
}
