use std::path::PathBuf;

/// Errors raised by the debugger components.
///
/// None of these escape the pipeline: the orchestrator folds every one of them into
/// the verdict artifact.
#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Python interpreter '{0}' could not be started")]
    InterpreterUnavailable(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox setup failed: {0}")]
    SandboxSetup(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DebuggerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DebuggerError::Io {
            path: path.into(),
            source,
        }
    }
}
