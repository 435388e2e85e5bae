//! Waiting for an external agent's output to settle.
//!
//! The agent gives no completion signal, so "finished" is approximated by "the
//! output has not changed for `stable_polls` consecutive reads". A slow agent that
//! pauses longer than `stable_polls * poll_interval` will be cut off early.

use crate::config::ConvergenceConfig;
use std::future::Future;
use std::path::Path;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Output stopped changing
    Converged(String),
    /// `max_wait` elapsed first; carries the last non-empty read, if any
    TimedOut(Option<String>),
}

/// Poll `read` until its output is stable or the wait limit is reached.
///
/// Empty or missing reads never count towards stability.
pub async fn wait_for_stable<F, Fut>(config: &ConvergenceConfig, mut read: F) -> Convergence
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let deadline = Instant::now() + config.max_wait();
    tokio::time::sleep(config.initial_wait()).await;

    let mut last: Option<String> = None;
    let mut unchanged = 0u32;
    loop {
        let current = read().await.filter(|text| !text.trim().is_empty());
        match current {
            Some(text) if last.as_deref() == Some(text.as_str()) => {
                unchanged += 1;
                if unchanged >= config.stable_polls {
                    tracing::debug!(polls = unchanged, "Agent output converged");
                    return Convergence::Converged(text);
                }
            }
            Some(text) => {
                last = Some(text);
                unchanged = 0;
            }
            None => unchanged = 0,
        }

        if Instant::now() >= deadline {
            tracing::warn!("Agent output did not settle before the wait limit");
            return Convergence::TimedOut(last);
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}

/// Wait for the file at `path` to settle.
pub async fn wait_for_file(config: &ConvergenceConfig, path: &Path) -> Convergence {
    wait_for_stable(config, || async move { tokio::fs::read_to_string(path).await.ok() }).await
}
