//! # Shell Module
//!
//! Entry point and command-line handling for the `pyai_debugger` binary.

pub mod cli;

pub use cli::{Cli, parse_bool_flag, run};
