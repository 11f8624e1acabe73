use crate::capture::StreamSource;
use std::sync::Arc;
use std::time::Duration;

/// Broad category of a [`ProcessError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The child could not be spawned
    Start,
    /// The child ran but did not exit successfully, or could not be waited on
    Wait,
    /// Reading one of the output streams failed
    StreamRead,
    /// The session API was misused
    Usage,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Process exited with code {0}")]
    ExitCode(i32),

    #[error("Process terminated by signal {0}")]
    Signal(i32),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process was terminated on request")]
    Terminated,

    #[error("Failed to wait for '{command}': {source}")]
    WaitFailed {
        command: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to read {stream}: {error}")]
    StreamRead {
        stream: StreamSource,
        #[source]
        error: Arc<std::io::Error>,
    },

    #[error("Capture session was already launched")]
    AlreadyLaunched,

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl ProcessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessError::CommandNotFound(_)
            | ProcessError::SpawnFailed { .. }
            | ProcessError::MockExpectationNotMet(_) => FailureKind::Start,
            ProcessError::ExitCode(_)
            | ProcessError::Signal(_)
            | ProcessError::Timeout(_)
            | ProcessError::Terminated
            | ProcessError::WaitFailed { .. } => FailureKind::Wait,
            ProcessError::StreamRead { .. } => FailureKind::StreamRead,
            ProcessError::AlreadyLaunched => FailureKind::Usage,
        }
    }

    /// Exit code reported by the child, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::ExitCode(code) => Some(*code),
            _ => None,
        }
    }

    /// Map a spawn error, singling out a missing executable
    pub(crate) fn from_spawn(error: std::io::Error, program: &str, command: String) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(program.to_string())
        } else {
            ProcessError::SpawnFailed {
                command,
                source: Arc::new(error),
            }
        }
    }
}
