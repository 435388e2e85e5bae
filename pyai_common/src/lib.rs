//! Types shared between the pyai debugger crates.

pub mod run_state;
