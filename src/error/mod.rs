use thiserror::Error;

use crate::config::ConfigError;
use crate::subprocess::ProcessError;

pub mod codes;

#[cfg(test)]
mod tests;

pub use codes::{describe_error_code, ErrorCode};

/// Exit status used when the command could not be found, as shells do
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Top-level error for the livecap binary and embedders that want codes
#[derive(Error, Debug)]
pub enum LivecapError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LivecapError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            exit_code: None,
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. } | Self::Execution { code, .. } | Self::Other { code, .. } => {
                *code
            }
        }
    }

    /// Process exit status the binary should end with.
    ///
    /// A child that exited with a code passes it through.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Execution {
                exit_code: Some(code),
                ..
            } => *code,
            Self::Execution { code, .. } if *code == ErrorCode::EXEC_COMMAND_NOT_FOUND => {
                EXIT_COMMAND_NOT_FOUND
            }
            Self::Execution { .. } | Self::Other { .. } => 1,
        }
    }

    pub fn describe(&self) -> &'static str {
        describe_error_code(self.code())
    }
}

/// Convert ProcessError to LivecapError
impl From<ProcessError> for LivecapError {
    fn from(err: ProcessError) -> Self {
        let code = match &err {
            ProcessError::CommandNotFound(_) => ErrorCode::EXEC_COMMAND_NOT_FOUND,
            ProcessError::SpawnFailed { .. } => ErrorCode::EXEC_SPAWN_FAILED,
            ProcessError::ExitCode(_) => ErrorCode::EXEC_SUBPROCESS_FAILED,
            ProcessError::Signal(_) => ErrorCode::EXEC_SIGNAL_RECEIVED,
            ProcessError::Timeout(_) => ErrorCode::EXEC_TIMEOUT,
            ProcessError::Terminated => ErrorCode::EXEC_INTERRUPTED,
            ProcessError::WaitFailed { .. } => ErrorCode::EXEC_WAIT_FAILED,
            ProcessError::StreamRead { .. } => ErrorCode::EXEC_OUTPUT_ERROR,
            ProcessError::AlreadyLaunched => ErrorCode::EXEC_ALREADY_LAUNCHED,
            ProcessError::MockExpectationNotMet(_) => ErrorCode::EXEC_GENERIC,
        };
        let command = match &err {
            ProcessError::CommandNotFound(program) => Some(program.clone()),
            ProcessError::SpawnFailed { command, .. } | ProcessError::WaitFailed { command, .. } => {
                Some(command.clone())
            }
            _ => None,
        };

        let mut error = LivecapError::execution_with_code(code, err.to_string(), command);
        if let LivecapError::Execution {
            exit_code: ex_code, ..
        } = &mut error
        {
            *ex_code = err.exit_code();
        }
        error.with_source(err)
    }
}

impl From<ConfigError> for LivecapError {
    fn from(err: ConfigError) -> Self {
        let code = match &err {
            ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorCode::CONFIG_NOT_FOUND
            }
            ConfigError::Io { .. } => ErrorCode::CONFIG_GENERIC,
            ConfigError::Parse(_) => ErrorCode::CONFIG_PARSE_ERROR,
            ConfigError::InvalidValue { .. } => ErrorCode::CONFIG_INVALID_VALUE,
        };
        LivecapError::config_with_code(code, err.to_string()).with_source(err)
    }
}
