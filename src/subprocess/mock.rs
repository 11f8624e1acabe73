use async_trait::async_trait;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream, ReadBuf};

use super::error::ProcessError;
use super::spawner::{
    ChildHandle, ExitStatus, OutputStream, ProcessCommand, ProcessSpawner, SpawnedProcess,
};

/// Scripted stand-in for a real process spawner.
///
/// Each expectation describes the bytes a fake child writes to stdout and
/// stderr, optional read/spawn/wait failures, and the exit status it reports.
#[derive(Clone, Default)]
pub struct MockProcessSpawner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
    kills: Arc<AtomicUsize>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    response: MockResponse,
    times_called: usize,
    expected_times: Option<usize>,
}

#[derive(Clone)]
struct MockResponse {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_error: Option<io::ErrorKind>,
    stderr_error: Option<io::ErrorKind>,
    spawn_error: Option<io::ErrorKind>,
    wait_error: Option<io::ErrorKind>,
    status: ExitStatus,
    run_until_killed: bool,
}

pub struct MockCommandConfig {
    spawner: MockProcessSpawner,
    expectation: MockExpectation,
}

impl MockProcessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            spawner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: MockResponse {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    stdout_error: None,
                    stderr_error: None,
                    spawn_error: None,
                    wait_error: None,
                    status: ExitStatus::Success,
                    run_until_killed: false,
                },
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = self.call_history.lock().unwrap();
        let count = history.iter().filter(|cmd| cmd.program == program).count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }

    /// Number of kill requests delivered to spawned mock children
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn reset(&mut self) {
        self.expectations.lock().unwrap().clear();
        self.call_history.lock().unwrap().clear();
        self.kills.store(0, Ordering::SeqCst);
    }

    fn respond(&self, command: &ProcessCommand) -> Result<MockResponse, ProcessError> {
        let mut expectations = self.expectations.lock().unwrap();

        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }

            if let Some(ref args_matcher) = expectation.args_matcher {
                if !(args_matcher)(&command.args) {
                    continue;
                }
            }

            expectation.times_called += 1;

            if let Some(expected) = expectation.expected_times {
                if expectation.times_called > expected {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "Command '{}' called {} times, expected {}",
                        command.program, expectation.times_called, expected
                    )));
                }
            }

            return Ok(expectation.response.clone());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }
}

impl ProcessSpawner for MockProcessSpawner {
    fn spawn(&self, command: &ProcessCommand) -> Result<SpawnedProcess, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let response = self.respond(command)?;

        if let Some(kind) = response.spawn_error {
            return Err(ProcessError::from_spawn(
                io::Error::new(kind, "mock spawn failure"),
                &command.program,
                command.display(),
            ));
        }

        // The write half stays with the child; dropping it on kill closes stdout.
        let (open_stdout, writer) = if response.run_until_killed {
            let (writer, reader) = tokio::io::duplex(64);
            (Some(reader), Some(writer))
        } else {
            (None, None)
        };

        Ok(SpawnedProcess {
            stdout: scripted_stream(response.stdout, response.stdout_error, open_stdout),
            stderr: scripted_stream(response.stderr, response.stderr_error, None),
            child: Box::new(MockChild {
                status: response.status,
                wait_error: response.wait_error,
                killed: false,
                writer,
                kills: Arc::clone(&self.kills),
            }),
        })
    }
}

fn scripted_stream(
    bytes: Vec<u8>,
    error: Option<io::ErrorKind>,
    open: Option<DuplexStream>,
) -> OutputStream {
    let mut stream: OutputStream = Box::new(Cursor::new(bytes));
    if let Some(kind) = error {
        stream = Box::new(stream.chain(FailingReader(kind)));
    }
    if let Some(open) = open {
        stream = Box::new(stream.chain(open));
    }
    stream
}

/// Reader whose every read fails with the given kind
struct FailingReader(io::ErrorKind);

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(self.0, "mock read failure")))
    }
}

struct MockChild {
    status: ExitStatus,
    wait_error: Option<io::ErrorKind>,
    killed: bool,
    writer: Option<DuplexStream>,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ChildHandle for MockChild {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(kind) = self.wait_error {
            return Err(io::Error::new(kind, "mock wait failure"));
        }
        if self.killed {
            return Ok(ExitStatus::Signal(9));
        }
        Ok(self.status)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.killed = true;
        self.writer.take();
        Ok(())
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    pub fn writes_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.as_bytes().to_vec();
        self
    }

    pub fn writes_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.as_bytes().to_vec();
        self
    }

    /// Raw stdout, for output that is not valid UTF-8
    pub fn writes_stdout_bytes(mut self, stdout: &[u8]) -> Self {
        self.expectation.response.stdout = stdout.to_vec();
        self
    }

    pub fn writes_stderr_bytes(mut self, stderr: &[u8]) -> Self {
        self.expectation.response.stderr = stderr.to_vec();
        self
    }

    /// Stdout fails with `kind` after its scripted bytes are read
    pub fn fails_stdout_read(mut self, kind: io::ErrorKind) -> Self {
        self.expectation.response.stdout_error = Some(kind);
        self
    }

    /// Stderr fails with `kind` after its scripted bytes are read
    pub fn fails_stderr_read(mut self, kind: io::ErrorKind) -> Self {
        self.expectation.response.stderr_error = Some(kind);
        self
    }

    pub fn fails_to_spawn(mut self, kind: io::ErrorKind) -> Self {
        self.expectation.response.spawn_error = Some(kind);
        self
    }

    pub fn fails_wait(mut self, kind: io::ErrorKind) -> Self {
        self.expectation.response.wait_error = Some(kind);
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn returns_signal(mut self, signal: i32) -> Self {
        self.expectation.response.status = ExitStatus::Signal(signal);
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.expectation.response.status = ExitStatus::Success;
        self
    }

    /// Keep stdout open after the scripted bytes until the child is killed
    pub fn runs_until_killed(mut self) -> Self {
        self.expectation.response.run_until_killed = true;
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        self.spawner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}
