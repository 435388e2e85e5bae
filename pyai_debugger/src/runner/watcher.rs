//! Memory watcher.
//!
//! One task per run samples the child's resident memory at a fixed interval. The
//! watcher never touches the child handle: when the limit is crossed it sends a kill
//! request to the main flow, which owns the child and performs the termination.

use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One resident-memory sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReading {
    Resident(u64),
    /// The process is gone; nothing left to watch
    NoSuchProcess,
    /// The probe itself failed
    Failed(String),
}

/// Source of resident-memory readings for a pid.
pub trait MemoryProbe: Send + 'static {
    fn resident_bytes(&mut self, pid: u32) -> ProbeReading;
}

/// Reads resident memory through `sysinfo`.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&mut self, pid: u32) -> ProbeReading {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return ProbeReading::NoSuchProcess;
        }
        match self.system.process(pid) {
            Some(process) => ProbeReading::Resident(process.memory()),
            None => ProbeReading::NoSuchProcess,
        }
    }
}

/// Why the watcher stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherOutcome {
    /// The child exited (or was reaped) while being watched
    ChildGone,
    /// Resident memory crossed the limit and a kill was requested
    Killed { resident_mb: f64 },
    /// Sampling failed for a reason other than a missing process
    ProbeFailed(String),
    /// The main flow finished first
    Cancelled,
}

/// Request from the watcher to the main flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillRequest {
    pub resident_bytes: u64,
}

/// Handle to a running watcher.
pub struct Watcher {
    handle: JoinHandle<(WatcherOutcome, u64)>,
    cancel: CancellationToken,
}

impl Watcher {
    /// Start watching `pid`. Kill requests arrive on `kill_tx`.
    pub fn spawn<P: MemoryProbe>(
        mut probe: P,
        pid: u32,
        limit_bytes: u64,
        interval: Duration,
        kill_tx: mpsc::Sender<KillRequest>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut peak = 0u64;
            loop {
                match probe.resident_bytes(pid) {
                    ProbeReading::Resident(bytes) => {
                        peak = peak.max(bytes);
                        if bytes > limit_bytes {
                            let resident_mb = bytes as f64 / (1024.0 * 1024.0);
                            tracing::warn!(pid, resident_mb, limit_bytes, "Resident memory above limit, requesting kill");
                            let _ = kill_tx.send(KillRequest { resident_bytes: bytes }).await;
                            return (WatcherOutcome::Killed { resident_mb }, peak);
                        }
                    }
                    ProbeReading::NoSuchProcess => {
                        tracing::debug!(pid, "Watched process is gone");
                        return (WatcherOutcome::ChildGone, peak);
                    }
                    ProbeReading::Failed(reason) => {
                        tracing::warn!(pid, %reason, "Memory probe failed, watcher stopping");
                        return (WatcherOutcome::ProbeFailed(reason), peak);
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => return (WatcherOutcome::Cancelled, peak),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        Self { handle, cancel }
    }

    /// Stop the watcher (if still running) and collect its outcome and the highest
    /// resident sample it saw.
    pub async fn finish(self) -> (WatcherOutcome, u64) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(result) => result,
            Err(e) => (WatcherOutcome::ProbeFailed(format!("watcher task failed: {e}")), 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<ProbeReading>);

    impl MemoryProbe for Scripted {
        fn resident_bytes(&mut self, _pid: u32) -> ProbeReading {
            self.0.pop_front().unwrap_or(ProbeReading::Resident(1))
        }
    }

    fn scripted(readings: Vec<ProbeReading>) -> Scripted {
        Scripted(readings.into())
    }

    #[tokio::test]
    async fn test_kill_requested_above_limit() {
        let (tx, mut rx) = mpsc::channel(1);
        let probe = scripted(vec![
            ProbeReading::Resident(10),
            ProbeReading::Resident(50),
            ProbeReading::Resident(2 * 1024 * 1024),
        ]);
        let watcher = Watcher::spawn(probe, 1, 1024 * 1024, Duration::from_millis(1), tx);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.resident_bytes, 2 * 1024 * 1024);
        let (outcome, peak) = watcher.finish().await;
        assert_eq!(outcome, WatcherOutcome::Killed { resident_mb: 2.0 });
        assert_eq!(peak, 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_missing_process_stops_watcher() {
        let (tx, mut rx) = mpsc::channel(1);
        let probe = scripted(vec![ProbeReading::Resident(10), ProbeReading::NoSuchProcess]);
        let watcher = Watcher::spawn(probe, 1, 100, Duration::from_millis(1), tx);

        assert!(rx.recv().await.is_none());
        assert_eq!(watcher.finish().await, (WatcherOutcome::ChildGone, 10));
    }

    #[tokio::test]
    async fn test_probe_failure_is_distinguished() {
        let (tx, _rx) = mpsc::channel(1);
        let probe = scripted(vec![ProbeReading::Failed("permission denied".into())]);
        let watcher = Watcher::spawn(probe, 1, 100, Duration::from_millis(1), tx);
        // Give the task a chance to take its first sample before cancelling.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (outcome, _) = watcher.finish().await;
        assert_eq!(outcome, WatcherOutcome::ProbeFailed("permission denied".into()));
    }

    #[tokio::test]
    async fn test_cancel_while_sleeping() {
        let (tx, _rx) = mpsc::channel(1);
        let watcher = Watcher::spawn(scripted(vec![]), 1, u64::MAX, Duration::from_secs(60), tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watcher.finish().await, (WatcherOutcome::Cancelled, 1));
    }

    #[test]
    fn test_sysinfo_probe_sees_current_process() {
        let mut probe = SysinfoProbe::new();
        match probe.resident_bytes(std::process::id()) {
            ProbeReading::Resident(bytes) => assert!(bytes > 0),
            other => panic!("unexpected reading {other:?}"),
        }
    }
}
