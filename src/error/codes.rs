/// Error code registry for livecap
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1007;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_INTERRUPTED: u16 = 4006;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_OUTPUT_ERROR: u16 = 4008;
    pub const EXEC_WAIT_FAILED: u16 = 4011;
    pub const EXEC_ALREADY_LAUNCHED: u16 = 4012;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_GENERIC => "General configuration error",
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_PARSE_ERROR => "Configuration could not be parsed",
        ErrorCode::CONFIG_INVALID_VALUE => "Invalid configuration value",

        ErrorCode::EXEC_GENERIC => "General execution error",
        ErrorCode::EXEC_COMMAND_NOT_FOUND => "Command not found",
        ErrorCode::EXEC_TIMEOUT => "Process timed out",
        ErrorCode::EXEC_SUBPROCESS_FAILED => "Process exited with a failure code",
        ErrorCode::EXEC_SIGNAL_RECEIVED => "Process killed by a signal",
        ErrorCode::EXEC_INTERRUPTED => "Process terminated on request",
        ErrorCode::EXEC_SPAWN_FAILED => "Process could not be spawned",
        ErrorCode::EXEC_OUTPUT_ERROR => "Reading process output failed",
        ErrorCode::EXEC_WAIT_FAILED => "Waiting for the process failed",
        ErrorCode::EXEC_ALREADY_LAUNCHED => "Capture session already launched",

        ErrorCode::OTHER_GENERIC => "Unexpected error",

        _ => "Unknown error code",
    }
}
