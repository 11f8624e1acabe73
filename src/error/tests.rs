use super::*;
use crate::capture::StreamSource;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_exit_code_failure_passes_code_through() {
    let err = LivecapError::from(ProcessError::ExitCode(3));
    assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.to_string(), "[E4003] Execution error: Process exited with code 3");
    assert!(err.source().is_some());
}

#[test]
fn test_command_not_found_mapping() {
    let err = LivecapError::from(ProcessError::CommandNotFound("nope".to_string()));
    assert_eq!(err.code(), ErrorCode::EXEC_COMMAND_NOT_FOUND);
    assert_eq!(err.exit_code(), EXIT_COMMAND_NOT_FOUND);
    match err {
        LivecapError::Execution { command, .. } => assert_eq!(command.as_deref(), Some("nope")),
        other => panic!("Expected Execution, got {other:?}"),
    }
}

#[test]
fn test_process_error_codes() {
    let cases = [
        (ProcessError::Signal(9), ErrorCode::EXEC_SIGNAL_RECEIVED),
        (
            ProcessError::Timeout(Duration::from_secs(1)),
            ErrorCode::EXEC_TIMEOUT,
        ),
        (ProcessError::Terminated, ErrorCode::EXEC_INTERRUPTED),
        (ProcessError::AlreadyLaunched, ErrorCode::EXEC_ALREADY_LAUNCHED),
        (
            ProcessError::StreamRead {
                stream: StreamSource::Stdout,
                error: Arc::new(std::io::Error::other("boom")),
            },
            ErrorCode::EXEC_OUTPUT_ERROR,
        ),
    ];

    for (process_error, expected) in cases {
        let err = LivecapError::from(process_error);
        assert_eq!(err.code(), expected);
        assert_eq!(err.exit_code(), 1);
    }
}

#[test]
fn test_config_error_mapping() {
    let parse = crate::config::CaptureConfig::from_toml_str("nonsense = [").unwrap_err();
    let err = LivecapError::from(parse);
    assert_eq!(err.code(), ErrorCode::CONFIG_PARSE_ERROR);
    assert_eq!(err.exit_code(), 2);

    let missing = crate::config::CaptureConfig::load(std::path::Path::new(
        "/definitely/not/here/livecap.toml",
    ))
    .unwrap_err();
    let err = LivecapError::from(missing);
    assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    assert_eq!(err.describe(), "Configuration file not found");
}

#[test]
fn test_other_error() {
    let err = LivecapError::other("Unknown error");
    assert_eq!(err.code(), ErrorCode::OTHER_GENERIC);
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.to_string(), "[E9000] Unknown error");
}
