//! # Sandbox Runner
//!
//! Runs a rewritten script as a child interpreter and classifies the result.
//!
//! ```text
//! Starting ──spawn──▶ Running ──┬── exit 0 ──────────▶ Passed
//!                               ├── exit != 0 ───────▶ Failed
//!                               ├── wall clock ──────▶ Timeout
//!                               └── watcher request ─▶ MemoryKilled
//! any setup or wait error ─────────────────────────────▶ Error
//! ```
//!
//! The main flow owns the child. It waits for whichever comes first: the child's
//! exit, the timeout, or a kill request from the [`watcher::Watcher`]. Only the main
//! flow terminates the child, through [`terminate::terminate`], which treats an
//! already-exited child as success.
//!
//! After the run, peak memory (from the child's allocation tracer, or the watcher's
//! highest resident sample when the tracer left no report) is compared against the
//! diagnostic fraction of the budget. Crossing it annotates the result with memory
//! figures whatever the status.

pub mod terminate;
pub mod tracer;
pub mod types;
pub mod watcher;

pub use terminate::{TerminateOutcome, terminate};
pub use tracer::AllocationTracer;
pub use types::{AllocationSite, ExecutionResult, MemoryReport, MemorySource, RunStatus};
pub use watcher::{KillRequest, MemoryProbe, ProbeReading, SysinfoProbe, Watcher, WatcherOutcome};

use crate::budget::MemoryBudget;
use crate::config::DebuggerConfig;
use crate::error::DebuggerError;
use pyai_common::run_state::RunStateMachine;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long to wait for the output pipes to drain once the child is gone.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runner knobs taken from [`DebuggerConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub interpreter: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub diagnostic_ratio: f64,
    pub top_allocations: usize,
    pub trace_allocations: bool,
}

impl From<&DebuggerConfig> for RunnerSettings {
    fn from(config: &DebuggerConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            diagnostic_ratio: config.diagnostic_ratio,
            top_allocations: config.top_allocations,
            trace_allocations: config.trace_allocations,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&DebuggerConfig::default())
    }
}

/// Executes one script once.
pub struct SandboxRunner<P: MemoryProbe = SysinfoProbe> {
    settings: RunnerSettings,
    probe: P,
    state: RunStateMachine,
}

impl SandboxRunner<SysinfoProbe> {
    pub fn new(settings: RunnerSettings) -> Self {
        Self::with_probe(settings, SysinfoProbe::new())
    }
}

impl<P: MemoryProbe> SandboxRunner<P> {
    pub fn with_probe(settings: RunnerSettings, probe: P) -> Self {
        Self {
            settings,
            probe,
            state: RunStateMachine::new(),
        }
    }

    /// The run's state machine. Grab it before [`run`](Self::run) to observe the run.
    pub fn state(&self) -> RunStateMachine {
        self.state.clone()
    }

    /// Run `script` against `budget`. Never fails; problems become [`RunStatus::Error`].
    pub async fn run(self, script: &Path, budget: &MemoryBudget) -> ExecutionResult {
        let started = Instant::now();
        let state = self.state.clone();
        tracing::info!(
            script = %script.display(),
            threshold_mb = budget.threshold_mb,
            timeout_secs = self.settings.timeout.as_secs_f64(),
            "Starting sandbox run"
        );

        let tracer = if self.settings.trace_allocations {
            match AllocationTracer::start(self.settings.top_allocations) {
                Ok(tracer) => Some(tracer),
                Err(e) => {
                    let _ = state.transition_to_terminal(RunStatus::Error.into());
                    return ExecutionResult::setup_error(e.to_string(), budget.threshold_mb, started.elapsed());
                }
            }
        } else {
            None
        };

        let settings = self.settings.clone();
        let executed = self.execute(script, budget, tracer.as_ref()).await;
        let traced = tracer.and_then(AllocationTracer::stop);

        let result = match executed {
            Ok(run) => run.into_result(traced, budget, &settings, started.elapsed()),
            Err(e) => {
                tracing::error!(error = %e, "Sandbox run failed before classification");
                ExecutionResult::setup_error(e.to_string(), budget.threshold_mb, started.elapsed())
            }
        };
        let _ = state.transition_to_terminal(result.status.into());
        tracing::info!(
            status = ?result.status,
            exit_code = ?result.exit_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            memory_exceeded = result.memory_exceeded,
            "Sandbox run classified"
        );
        result
    }

    async fn execute(
        self,
        script: &Path,
        budget: &MemoryBudget,
        tracer: Option<&AllocationTracer>,
    ) -> Result<FinishedRun, DebuggerError> {
        std::fs::metadata(script).map_err(|e| DebuggerError::io(script, e))?;
        // The child runs from the script's directory, so relative paths would break.
        let script = std::path::absolute(script).map_err(|e| DebuggerError::io(script, e))?;
        let script = script.as_path();

        let mut command = Command::new(&self.settings.interpreter);
        match tracer {
            Some(tracer) => command.args(tracer.interpreter_args(script)),
            None => command.arg(script),
        };
        if let Some(dir) = script.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DebuggerError::InterpreterUnavailable(self.settings.interpreter.clone())
            } else {
                DebuggerError::Spawn {
                    program: self.settings.interpreter.clone(),
                    source,
                }
            }
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (kill_tx, mut kill_rx) = mpsc::channel(1);
        let still_running = matches!(child.try_wait(), Ok(None));
        let watcher = match child.id() {
            Some(pid) if still_running => Some(Watcher::spawn(
                self.probe,
                pid,
                budget.threshold_bytes(),
                self.settings.poll_interval,
                kill_tx,
            )),
            _ => None,
        };
        let pid = child.id().unwrap_or_default();
        tracing::debug!(pid, watcher_active = watcher.is_some(), "Child running");
        let _ = self.state.transition_to_running(pid, watcher.is_some());

        let ending = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Ending::Exited(status),
                Err(e) => Ending::WaitFailed(e),
            },
            _ = tokio::time::sleep(self.settings.timeout) => Ending::TimedOut,
            Some(request) = kill_rx.recv() => Ending::KillRequested(request),
        };

        let (status, exit_code, wait_error) = match ending {
            Ending::Exited(exit) => {
                let status = if exit.success() {
                    RunStatus::Passed
                } else {
                    RunStatus::Failed
                };
                (status, exit.code(), None)
            }
            Ending::TimedOut => {
                tracing::warn!(pid, "Wall-clock limit reached, terminating child");
                stop_child(&mut child).await;
                (RunStatus::Timeout, None, None)
            }
            Ending::KillRequested(request) => {
                tracing::warn!(pid, resident_bytes = request.resident_bytes, "Terminating child over memory budget");
                stop_child(&mut child).await;
                (RunStatus::MemoryKilled, None, None)
            }
            Ending::WaitFailed(e) => {
                stop_child(&mut child).await;
                (RunStatus::Error, None, Some(e))
            }
        };

        let (watcher_outcome, resident_peak) = match watcher {
            Some(watcher) => {
                let (outcome, peak) = watcher.finish().await;
                (Some(outcome), peak)
            }
            None => (None, 0),
        };
        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        if let Some(e) = wait_error {
            return Err(DebuggerError::SandboxSetup(format!("waiting for the child failed: {e}")));
        }
        Ok(FinishedRun {
            status,
            exit_code,
            stdout,
            stderr,
            watcher_started: watcher_outcome.is_some(),
            watcher: watcher_outcome,
            resident_peak,
        })
    }
}

enum Ending {
    Exited(ExitStatus),
    TimedOut,
    KillRequested(KillRequest),
    WaitFailed(std::io::Error),
}

/// Raw facts of a run before memory classification.
struct FinishedRun {
    status: RunStatus,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    watcher_started: bool,
    watcher: Option<WatcherOutcome>,
    resident_peak: u64,
}

impl FinishedRun {
    fn into_result(
        self,
        traced: Option<MemoryReport>,
        budget: &MemoryBudget,
        settings: &RunnerSettings,
        elapsed: Duration,
    ) -> ExecutionResult {
        // Without a tracer report the watcher's highest sample stands in for both figures.
        let memory = traced.or_else(|| {
            (self.resident_peak > 0).then(|| MemoryReport {
                current: self.resident_peak,
                peak: self.resident_peak,
                top: Vec::new(),
                source: MemorySource::ResidentSample,
            })
        });
        let limit = budget.threshold_bytes() as f64 * settings.diagnostic_ratio;
        let memory_exceeded = memory.as_ref().is_some_and(|m| m.peak as f64 > limit);

        ExecutionResult {
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
            threshold_mb: budget.threshold_mb,
            memory,
            memory_exceeded,
            watcher_started: self.watcher_started,
            watcher: self.watcher,
            error: None,
            elapsed,
        }
    }
}

async fn stop_child(child: &mut Child) {
    match terminate(child).await {
        Ok(outcome) => tracing::debug!(?outcome, "Child stopped"),
        Err(e) => tracing::warn!(error = %e, "Could not terminate child"),
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf).await
        {
            tracing::debug!(error = %e, "Reading child output failed");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(handle: JoinHandle<String>) -> String {
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Output reader task failed");
            String::new()
        }
        Err(_) => {
            tracing::warn!("Child output still open after exit, leaving it unread");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyai_common::run_state::{RunState, Terminal};

    #[test]
    fn test_settings_follow_config() {
        let config = DebuggerConfig {
            interpreter: "python3.12".into(),
            timeout_secs: 3,
            ..DebuggerConfig::default()
        };
        let settings = RunnerSettings::from(&config);
        assert_eq!(settings.interpreter, "python3.12");
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_missing_script_is_error() {
        let runner = SandboxRunner::new(RunnerSettings::default());
        let state = runner.state();
        let budget = MemoryBudget::estimate("", 1024.0);
        let result = runner.run(Path::new("/no/such/dir/new_script.py"), &budget).await;

        assert_eq!(result.status, RunStatus::Error);
        assert!(result.diagnostic_text().starts_with("DEBUGGING ERROR:\n"));
        assert!(result.diagnostic_text().contains("/no/such/dir/new_script.py"));
        assert_eq!(state.current(), RunState::Finished(Terminal::Errored));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("new_script.py");
        std::fs::write(&script, "print('hi')\n").unwrap();
        let settings = RunnerSettings {
            interpreter: "/definitely/not/python".into(),
            ..RunnerSettings::default()
        };

        let result = SandboxRunner::new(settings)
            .run(&script, &MemoryBudget::estimate("", 1024.0))
            .await;
        assert_eq!(result.status, RunStatus::Error);
        assert!(result.diagnostic_text().contains("/definitely/not/python"));
    }

    #[test]
    fn test_resident_sample_stands_in_for_tracer() {
        let run = FinishedRun {
            status: RunStatus::Passed,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            watcher_started: true,
            watcher: Some(WatcherOutcome::ChildGone),
            resident_peak: 950 * 1024 * 1024,
        };
        let budget = MemoryBudget::estimate("", 1024.0);
        let result = run.into_result(None, &budget, &RunnerSettings::default(), Duration::ZERO);

        let memory = result.memory.as_ref().unwrap();
        assert_eq!(memory.source, MemorySource::ResidentSample);
        assert!(result.memory_exceeded);
        assert!(result.diagnostic_text().starts_with("Current memory usage: 950.00MB"));
    }
}
