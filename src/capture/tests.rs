use super::*;
use crate::config::CaptureConfig;
use crate::subprocess::{FailureKind, MockProcessSpawner, ProcessCommand, ProcessError};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use StreamSource::{Stderr, Stdout};

fn session_with(mock: &MockProcessSpawner) -> CaptureSession {
    CaptureSession::with_spawner(Arc::new(mock.clone()), CaptureConfig::default())
}

async fn wait_for_state(session: &CaptureSession, state: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session should reach state");
}

#[tokio::test]
async fn test_successful_run_captures_both_streams() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("tool")
        .writes_stdout("out1\nout2\n")
        .writes_stderr("err1\n")
        .returns_success()
        .finish();
    let session = session_with(&mock);

    session.launch("tool", ["--go"]).await.unwrap();

    let snap = session.snapshot(true);
    assert_eq!(snap.lines_from(Stdout), vec!["out1\n", "out2\n"]);
    assert_eq!(snap.lines_from(Stderr), vec!["err1\n"]);
    assert_eq!(snap.origins.as_ref().map(Vec::len), Some(snap.len()));
    assert_eq!(session.state(), LifecycleState::Completed);
    assert!(session.is_complete());
    assert!(session.error().is_none());
    assert_eq!(mock.get_call_history()[0].args, vec!["--go"]);
}

#[tokio::test]
async fn test_failed_exit_preserves_output() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("crashy")
        .writes_stdout("working\nhalf")
        .writes_stderr("fatal: boom\n")
        .returns_exit_code(2)
        .finish();
    let session = session_with(&mock);

    let err = session
        .launch("crashy", std::iter::empty::<&str>())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::ExitCode(2)));
    assert_eq!(err.kind(), FailureKind::Wait);
    assert!(matches!(session.error(), Some(ProcessError::ExitCode(2))));

    let snap = session.snapshot(true);
    assert_eq!(snap.lines_from(Stdout), vec!["working\n", "half"]);
    assert_eq!(snap.lines_from(Stderr), vec!["fatal: boom\n"]);
}

#[tokio::test]
async fn test_signal_exit_is_reported() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("segv")
        .writes_stdout("before crash\n")
        .returns_signal(11)
        .finish();
    let session = session_with(&mock);

    let err = session.launch("segv", Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(err, ProcessError::Signal(11)));
    assert_eq!(session.snapshot(false).lines, vec!["before crash\n"]);
}

#[tokio::test]
async fn test_start_failure_short_circuits() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("ghost")
        .fails_to_spawn(ErrorKind::NotFound)
        .finish();
    let session = session_with(&mock);

    let err = session
        .launch("ghost", Vec::<String>::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Start);
    assert!(session.snapshot(false).is_empty());
    assert_eq!(session.state(), LifecycleState::Completed);
    assert!(matches!(
        session.error(),
        Some(ProcessError::CommandNotFound(_))
    ));
}

#[tokio::test]
async fn test_read_failure_is_reported_when_exit_succeeds() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("flaky")
        .writes_stdout("kept\npart")
        .fails_stdout_read(ErrorKind::BrokenPipe)
        .writes_stderr("still read\n")
        .finish();
    let session = session_with(&mock);

    let err = session
        .launch("flaky", Vec::<String>::new())
        .await
        .unwrap_err();

    match &err {
        ProcessError::StreamRead { stream, error } => {
            assert_eq!(*stream, Stdout);
            assert_eq!(error.kind(), ErrorKind::BrokenPipe);
        }
        other => panic!("Expected StreamRead, got {other:?}"),
    }

    // The other stream is unaffected and the stdout fragment is flushed
    let snap = session.snapshot(true);
    assert_eq!(snap.lines_from(Stdout), vec!["kept\n", "part"]);
    assert_eq!(snap.lines_from(Stderr), vec!["still read\n"]);
}

#[tokio::test]
async fn test_exit_failure_outranks_read_failure() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("flaky")
        .fails_stderr_read(ErrorKind::BrokenPipe)
        .returns_exit_code(4)
        .finish();
    let session = session_with(&mock);

    let err = session
        .launch("flaky", Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::ExitCode(4)));
}

#[tokio::test]
async fn test_wait_failure_keeps_output() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("lost")
        .writes_stdout("done\n")
        .fails_wait(ErrorKind::Other)
        .finish();
    let session = session_with(&mock);

    let err = session
        .launch("lost", Vec::<String>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::WaitFailed { .. }));
    assert_eq!(err.kind(), FailureKind::Wait);
    assert_eq!(session.combined_bytes(), b"done\n");
}

#[tokio::test]
async fn test_second_launch_is_rejected() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("once")
        .writes_stdout("only\n")
        .finish();
    let session = session_with(&mock);

    session.launch("once", Vec::<String>::new()).await.unwrap();
    let err = session
        .launch("once", Vec::<String>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::AlreadyLaunched));
    assert_eq!(err.kind(), FailureKind::Usage);
    assert!(session.error().is_none());
    assert_eq!(session.snapshot(false).lines, vec!["only\n"]);
    assert!(mock.verify_called("once", 1));
}

#[tokio::test]
async fn test_terminate_kills_running_child() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("server")
        .writes_stdout("ready\n")
        .runs_until_killed()
        .finish();
    let session = session_with(&mock);

    let runner = session.clone();
    let handle = tokio::spawn(async move { runner.launch("server", ["--port", "0"]).await });

    wait_for_state(&session, LifecycleState::ReadersDraining).await;
    assert!(!session.is_complete());
    assert!(session.error().is_none());

    session.terminate();
    let err = handle.await.unwrap().unwrap_err();

    assert!(matches!(err, ProcessError::Terminated));
    assert_eq!(session.snapshot(false).lines, vec!["ready\n"]);
    assert_eq!(mock.kill_count(), 1);
}

#[tokio::test]
async fn test_terminate_before_launch_is_remembered() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("server").runs_until_killed().finish();
    let session = session_with(&mock);

    session.terminate();
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        session.launch("server", Vec::<String>::new()),
    )
    .await
    .expect("launch should not hang")
    .unwrap_err();

    assert!(matches!(err, ProcessError::Terminated));
}

#[tokio::test]
async fn test_timeout_kills_child() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("slow")
        .writes_stdout("started\n")
        .runs_until_killed()
        .finish();
    let session = session_with(&mock);

    let command = ProcessCommand::new("slow").timeout(Duration::from_millis(50));
    let err = session.launch_command(command).await.unwrap_err();

    assert!(matches!(err, ProcessError::Timeout(d) if d == Duration::from_millis(50)));
    assert_eq!(session.snapshot(false).lines, vec!["started\n"]);
    assert_eq!(mock.kill_count(), 1);
}

#[tokio::test]
async fn test_default_timeout_from_config() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("slow").runs_until_killed().finish();
    let config = CaptureConfig {
        default_timeout: Some(Duration::from_millis(30)),
        ..Default::default()
    };
    let session = CaptureSession::with_spawner(Arc::new(mock.clone()), config);

    let err = session
        .launch("slow", Vec::<String>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Timeout(_)));
    assert_eq!(
        mock.get_call_history()[0].timeout,
        Some(Duration::from_millis(30))
    );
}

#[tokio::test]
async fn test_explicit_timeout_overrides_default() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("quick").writes_stdout("ok\n").finish();
    let config = CaptureConfig {
        default_timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let session = CaptureSession::with_spawner(Arc::new(mock.clone()), config);

    let command = ProcessCommand::new("quick").timeout(Duration::from_secs(5));
    session.launch_command(command).await.unwrap();

    assert_eq!(
        mock.get_call_history()[0].timeout,
        Some(Duration::from_secs(5))
    );
}

#[tokio::test]
async fn test_every_waiter_sees_completion() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("server")
        .writes_stdout("line\n")
        .runs_until_killed()
        .finish();
    let session = session_with(&mock);

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move {
                session.wait_completion().await;
                (session.snapshot(false).lines, session.error().is_some())
            })
        })
        .collect();

    let runner = session.clone();
    let handle = tokio::spawn(async move { runner.launch("server", Vec::<String>::new()).await });
    wait_for_state(&session, LifecycleState::ReadersDraining).await;
    session.terminate();
    assert!(handle.await.unwrap().is_err());

    for waiter in waiters {
        let (lines, has_error) = waiter.await.unwrap();
        assert_eq!(lines, vec!["line\n"]);
        assert!(has_error);
    }
}

#[tokio::test]
async fn test_snapshot_before_launch_is_empty() {
    let session = CaptureSession::new();
    assert!(session.snapshot(true).is_empty());
    assert!(session.combined_bytes().is_empty());
    assert_eq!(session.state(), LifecycleState::Created);
    assert!(session.error().is_none());
}

#[tokio::test]
async fn test_dropped_launch_terminates_and_completes() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("server")
        .writes_stdout("ready\n")
        .runs_until_killed()
        .finish();
    let session = session_with(&mock);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        session.launch("server", Vec::<String>::new()),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::timeout(Duration::from_secs(2), session.wait_completion())
        .await
        .expect("completion should fire after the launch future is dropped");

    assert_eq!(session.state(), LifecycleState::Completed);
    assert!(matches!(session.error(), Some(ProcessError::Terminated)));
    assert_eq!(session.snapshot(false).lines, vec!["ready\n"]);
    assert_eq!(mock.kill_count(), 1);

    let err = session
        .launch("server", Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyLaunched));
}

#[tokio::test]
async fn test_non_utf8_output_round_trips() {
    let mut mock = MockProcessSpawner::new();
    mock.expect_command("binary")
        .writes_stdout_bytes(b"a\xffb\n")
        .writes_stderr_bytes(b"\xfe")
        .finish();
    let session = session_with(&mock);

    session.launch("binary", Vec::<String>::new()).await.unwrap();

    let raw = session.raw_lines();
    assert!(raw.contains(&b"a\xffb\n".to_vec()));
    assert!(raw.contains(&b"\xfe".to_vec()));
    assert_eq!(session.combined_bytes().len(), 5);

    let snap = session.snapshot(true);
    assert_eq!(snap.lines_from(Stdout), vec!["a\u{FFFD}b\n"]);
    assert_eq!(snap.lines_from(Stderr), vec!["\u{FFFD}"]);
}
