//! Observable lifecycle of a single sandbox run.
//!
//! A run moves `Starting -> Running -> <terminal>` exactly once. The state lives in a
//! `tokio::sync::watch` channel so that callers (and tests) can observe transitions
//! as they happen instead of polling the runner.
//!
//! # Example
//!
//! ```rust,ignore
//! use pyai_common::run_state::{RunState, RunStateMachine, Terminal};
//!
//! let sm = RunStateMachine::new();
//! sm.transition_to_running(4242, true).unwrap();
//! sm.transition_to_terminal(Terminal::Passed).unwrap();
//!
//! let outcome = sm.wait_for_terminal().await;
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// How a run ended. Every variant is final for the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Passed,
    Failed,
    TimedOut,
    MemoryKilled,
    Errored,
}

/// Run lifecycle states.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// Tracing enabled, child not yet confirmed running
    Starting,

    /// Child launched; `watcher_active` records whether the memory watcher was started
    Running { pid: u32, watcher_active: bool },

    /// Run classified
    Finished(Terminal),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished(_))
    }

    /// Whether the watcher was started for this run. `None` before the child is running.
    pub fn watcher_active(&self) -> Option<bool> {
        match self {
            RunState::Running { watcher_active, .. } => Some(*watcher_active),
            _ => None,
        }
    }
}

/// Watch-channel backed run state machine.
#[derive(Clone)]
pub struct RunStateMachine {
    sender: Arc<watch::Sender<RunState>>,
    // Keeps the channel open even when nobody subscribed
    _receiver: watch::Receiver<RunState>,
}

impl RunStateMachine {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(RunState::Starting);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    pub fn current(&self) -> RunState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.sender.subscribe()
    }

    /// Starting -> Running
    pub fn transition_to_running(&self, pid: u32, watcher_active: bool) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if matches!(state, RunState::Starting) {
                *state = RunState::Running {
                    pid,
                    watcher_active,
                };
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Can only transition to Running from Starting")
        }
    }

    /// Starting | Running -> Finished. A setup error may finish a run that never started.
    pub fn transition_to_terminal(&self, terminal: Terminal) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if !state.is_terminal() {
                *state = RunState::Finished(terminal);
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Run already classified")
        }
    }

    /// Wait until the child is confirmed running (or the run ended without getting there).
    pub async fn wait_for_running(&self) -> RunState {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if !matches!(*state, RunState::Starting) {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.current();
            }
        }
    }

    /// Wait until the run is classified.
    pub async fn wait_for_terminal(&self) -> Terminal {
        let mut rx = self.sender.subscribe();
        loop {
            {
                if let RunState::Finished(terminal) = &*rx.borrow_and_update() {
                    return *terminal;
                }
            }
            if rx.changed().await.is_err() {
                return Terminal::Errored;
            }
        }
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStateMachine")
            .field("state", &*self.sender.borrow())
            .finish()
    }
}
