//! # Logging Initialization
//!
//! One global `tracing` subscriber per process, set up by [`init_logging`].
//!
//! - **Filter**: `RUST_LOG` when set, otherwise `<level>,pyai_debugger=debug`.
//! - **File (default)**: a daily rolling `pyai_debugger.log` in the user cache
//!   directory, without ANSI colors.
//! - **Stderr**: with `log_to_file = false`, or whenever the cache directory cannot
//!   be created or written, logs go to stderr with colors.
//!
//! Nothing is ever logged to stdout; the binary reserves it for agent output.

use anyhow::Result;
use directories::ProjectDirs;
use std::path::Path;
use std::{io::stderr, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    init_logging("trace", false).expect("Failed to initialize test logging");
}

/// Initializes the logging system. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},pyai_debugger=debug")));

        let log_dir = if log_to_file {
            ProjectDirs::from("com", "PyAi", "pyai_debugger")
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .filter(|dir| std::fs::create_dir_all(dir).is_ok() && test_write_permission(dir))
        } else {
            None
        };

        match log_dir {
            Some(dir) => {
                let file_appender = tracing_appender::rolling::daily(&dir, "pyai_debugger.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed at exit.
                Box::leak(Box::new(guard));
            }
            None => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(stderr).with_ansi(true))
                    .init();
            }
        }
    });

    Ok(())
}

fn test_write_permission(dir: &Path) -> bool {
    let probe = dir.join(".pyai_write_test");
    let writable = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    writable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        init_logging("info", true).unwrap();
        tracing::debug!("logging initialised twice without panicking");
    }

    #[test]
    fn test_write_permission_probe() {
        let dir = tempfile::tempdir().unwrap();
        assert!(test_write_permission(dir.path()));
        assert!(!test_write_permission(&dir.path().join("missing")));
    }
}
