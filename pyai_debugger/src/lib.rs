//! # PyAI Debugger
//!
//! Sandboxed execution and source neutralization for Python scripts handed back and
//! forth with an external repair agent.
//!
//! One invocation takes a script, makes it runnable without a person at the
//! keyboard and without touching files outside a sandbox root, runs it under a
//! memory budget and a wall-clock limit, and writes a verdict the agent can act on.
//!
//! ## Modules
//!
//! - **`rewrite`**: Reversible, idempotent text rules: `input()` neutralization,
//!   required-argument relaxation and the two path virtualization passes.
//! - **`budget`**: Memory ceiling from script size and cyclomatic complexity.
//! - **`audit`**: Top-level imports the interpreter cannot resolve.
//! - **`runner`**: Child process, memory watcher, timeout and classification.
//! - **`verdict`**, **`handoff`**: The artifacts consumed by the agent.
//! - **`pipeline`**: Runs all of the above once and never fails.
//! - **`convergence`**: Waiting for the agent's output to settle.
//! - **`shell`**: Command-line entry point.

pub mod audit;
pub mod budget;
pub mod config;
pub mod convergence;
pub mod error;
pub mod handoff;
pub mod pipeline;
pub mod rewrite;
pub mod runner;
pub mod shell;
pub mod utils;
pub mod verdict;

// Test utilities
pub mod test_utils;

pub use config::DebuggerConfig;
pub use error::DebuggerError;
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest};
pub use runner::{ExecutionResult, RunStatus, SandboxRunner};
pub use verdict::Verdict;
