//! Capture session: spawn, drain both streams, then reap.

use super::lifecycle::{Lifecycle, LifecycleState};
use super::log::LineLog;
use super::reader;
use super::types::{Snapshot, StreamSource};
use crate::config::CaptureConfig;
use crate::subprocess::{
    ChildHandle, ExitStatus, ProcessCommand, ProcessError, ProcessSpawner, TokioProcessSpawner,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

/// Runs one child process and records its output line by line.
///
/// The session is a cheap handle; clones share the same log and lifecycle, so
/// one clone can drive [`launch`](Self::launch) on its own task while others
/// take snapshots or wait for completion.
///
/// Lines from one stream keep their emission order. Lines from stdout and
/// stderr interleave in whatever order the two readers happened to append
/// them, which is not necessarily the order the child wrote them.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    spawner: Arc<dyn ProcessSpawner>,
    config: CaptureConfig,
    log: Arc<LineLog>,
    lifecycle: Lifecycle,
    launched: AtomicBool,
    terminal_error: OnceLock<ProcessError>,
    kill_request: Notify,
}

/// Why the coordinator killed the child
#[derive(Debug, Clone, Copy)]
enum KillReason {
    Timeout(Duration),
    Requested,
}

impl KillReason {
    fn into_error(self) -> ProcessError {
        match self {
            KillReason::Timeout(after) => ProcessError::Timeout(after),
            KillReason::Requested => ProcessError::Terminated,
        }
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::with_config(CaptureConfig::default())
    }

    pub fn with_config(config: CaptureConfig) -> Self {
        Self::with_spawner(Arc::new(TokioProcessSpawner), config)
    }

    pub fn with_spawner(spawner: Arc<dyn ProcessSpawner>, config: CaptureConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                spawner,
                config,
                log: Arc::new(LineLog::new()),
                lifecycle: Lifecycle::new(),
                launched: AtomicBool::new(false),
                terminal_error: OnceLock::new(),
                kill_request: Notify::new(),
            }),
        }
    }

    /// Run `program` with `args` to completion, capturing its output.
    ///
    /// See [`launch_command`](Self::launch_command).
    pub async fn launch<I, S>(&self, program: &str, args: I) -> Result<(), ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.launch_command(ProcessCommand::new(program).args(args)).await
    }

    /// Spawn the command, drain both output streams, then collect its exit
    /// status. Completion is signaled exactly once whatever the outcome, and
    /// any error is also kept for [`error`](Self::error).
    ///
    /// The work runs on its own task. Dropping the returned future before it
    /// resolves terminates the child; the session still drains, reaps and
    /// completes in the background with [`ProcessError::Terminated`].
    ///
    /// A session can be launched once. Later calls fail with
    /// [`ProcessError::AlreadyLaunched`] and leave the session untouched.
    pub async fn launch_command(&self, command: ProcessCommand) -> Result<(), ProcessError> {
        if self.inner.launched.swap(true, Ordering::SeqCst) {
            return Err(ProcessError::AlreadyLaunched);
        }

        let command_line = command.display();
        let session = self.clone();
        let coordinator = tokio::spawn(async move { session.coordinate(command).await });

        let mut guard = TerminateOnDrop::new(self);
        let joined = coordinator.await;
        guard.disarm();

        joined.unwrap_or_else(|e| {
            let error = coordinator_failure(&command_line, e);
            self.finish(Err(error), &command_line, Instant::now())
        })
    }

    /// Run the command on a nested task so that a panic inside it still
    /// completes the session.
    async fn coordinate(&self, command: ProcessCommand) -> Result<(), ProcessError> {
        let start = Instant::now();
        let command_line = command.display();

        let session = self.clone();
        let result = tokio::spawn(async move { session.run(command).await })
            .await
            .unwrap_or_else(|e| Err(coordinator_failure(&command_line, e)));

        self.finish(result, &command_line, start)
    }

    /// Record the outcome, freeze the log and fire the completion signal.
    /// Only the first call has any effect on the session.
    fn finish(
        &self,
        result: Result<(), ProcessError>,
        command_line: &str,
        start: Instant,
    ) -> Result<(), ProcessError> {
        if let Err(e) = &result {
            let _ = self.inner.terminal_error.set(e.clone());
        }
        self.inner.log.freeze();
        if !self.inner.lifecycle.complete() {
            return result;
        }

        match &result {
            Ok(()) => tracing::debug!(
                "Captured {} lines from '{}' in {:?}",
                self.inner.log.len(),
                command_line,
                start.elapsed()
            ),
            Err(e) => tracing::debug!(
                "'{}' finished with error after {:?} ({} lines captured): {}",
                command_line,
                start.elapsed(),
                self.inner.log.len(),
                e
            ),
        }

        result
    }

    async fn run(&self, mut command: ProcessCommand) -> Result<(), ProcessError> {
        command.timeout = command.effective_timeout(self.inner.config.default_timeout);

        // A start failure ends here; no reader is ever started.
        let spawned = self.inner.spawner.spawn(&command)?;
        self.inner.lifecycle.advance(LifecycleState::Started);

        let buffer_size = self.inner.config.read_buffer_size;
        let stdout = tokio::spawn(reader::drain(
            spawned.stdout,
            StreamSource::Stdout,
            Arc::clone(&self.inner.log),
            buffer_size,
        ));
        let stderr = tokio::spawn(reader::drain(
            spawned.stderr,
            StreamSource::Stderr,
            Arc::clone(&self.inner.log),
            buffer_size,
        ));
        self.inner.lifecycle.advance(LifecycleState::ReadersDraining);

        let mut child = spawned.child;
        let (kill_reason, read_result) = self
            .drain_readers(child.as_mut(), stdout, stderr, command.timeout)
            .await;
        self.inner.lifecycle.advance(LifecycleState::Exited);

        // Reap only now that both pipes are fully drained.
        let status = child.wait().await;

        if let Some(reason) = kill_reason {
            if let Err(e) = &status {
                tracing::debug!("Wait after kill failed: {}", e);
            }
            return Err(reason.into_error());
        }

        let status = status.map_err(|source| ProcessError::WaitFailed {
            command: command.display(),
            source: Arc::new(source),
        })?;

        match status {
            ExitStatus::Success => read_result,
            ExitStatus::Error(code) => Err(ProcessError::ExitCode(code)),
            ExitStatus::Signal(signal) => {
                tracing::warn!("'{}' terminated by signal {}", command.program, signal);
                Err(ProcessError::Signal(signal))
            }
        }
    }

    /// Wait for both readers to finish, killing the child on timeout or on a
    /// termination request. The readers are always awaited to the end.
    async fn drain_readers(
        &self,
        child: &mut dyn ChildHandle,
        stdout: JoinHandle<Result<(), ProcessError>>,
        stderr: JoinHandle<Result<(), ProcessError>>,
        timeout: Option<Duration>,
    ) -> (Option<KillReason>, Result<(), ProcessError>) {
        let readers = async { tokio::join!(stdout, stderr) };
        tokio::pin!(readers);

        let deadline = async {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut kill_reason = None;
        let (stdout, stderr) = loop {
            tokio::select! {
                joined = &mut readers => break joined,
                _ = &mut deadline, if kill_reason.is_none() => {
                    let after = timeout.unwrap_or_default();
                    tracing::warn!("Process timed out after {:?}, killing it", after);
                    kill_reason = Some(KillReason::Timeout(after));
                    kill_child(child);
                }
                _ = self.inner.kill_request.notified(), if kill_reason.is_none() => {
                    tracing::warn!("Termination requested, killing process");
                    kill_reason = Some(KillReason::Requested);
                    kill_child(child);
                }
            }
        };

        let stdout = flatten_join(stdout, StreamSource::Stdout);
        let stderr = flatten_join(stderr, StreamSource::Stderr);
        (kill_reason, stdout.and(stderr))
    }

    /// Ask a running launch to kill its child.
    ///
    /// The request is remembered if the child is not running yet. Captured
    /// output is kept and the session ends with [`ProcessError::Terminated`].
    pub fn terminate(&self) {
        self.inner.kill_request.notify_one();
    }

    /// Copy of everything captured so far. Never waits on the child.
    pub fn snapshot(&self, include_origin: bool) -> Snapshot {
        self.inner.log.snapshot(include_origin)
    }

    /// All captured bytes concatenated in log order, exactly as written
    pub fn combined_bytes(&self) -> Vec<u8> {
        self.inner.log.combined_bytes()
    }

    /// Captured lines as raw bytes, for output that is not UTF-8
    pub fn raw_lines(&self) -> Vec<Vec<u8>> {
        self.inner.log.raw_lines()
    }

    /// Wait until the session reaches `Completed`
    pub async fn wait_completion(&self) {
        self.inner.lifecycle.signal().wait().await
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lifecycle.is_complete()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// The error the session ended with. `None` on success and before
    /// completion.
    pub fn error(&self) -> Option<ProcessError> {
        if !self.is_complete() {
            return None;
        }
        self.inner.terminal_error.get().cloned()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("lines", &self.inner.log.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Requests termination if a `launch` future is dropped mid-run
struct TerminateOnDrop<'a> {
    session: Option<&'a CaptureSession>,
}

impl<'a> TerminateOnDrop<'a> {
    fn new(session: &'a CaptureSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn disarm(&mut self) {
        self.session = None;
    }
}

impl Drop for TerminateOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Launch dropped before completion, terminating child");
            session.terminate();
        }
    }
}

/// A coordinator task that panicked or was cancelled by runtime shutdown
fn coordinator_failure(command_line: &str, error: JoinError) -> ProcessError {
    ProcessError::WaitFailed {
        command: command_line.to_string(),
        source: Arc::new(std::io::Error::other(error.to_string())),
    }
}

fn kill_child(child: &mut dyn ChildHandle) {
    if let Err(e) = child.kill() {
        tracing::warn!("Failed to kill process {:?}: {}", child.id(), e);
    }
}

/// A panicked reader counts as a failed read of its stream
fn flatten_join(
    joined: Result<Result<(), ProcessError>, JoinError>,
    stream: StreamSource,
) -> Result<(), ProcessError> {
    joined.unwrap_or_else(|e| {
        Err(ProcessError::StreamRead {
            stream,
            error: Arc::new(std::io::Error::other(e.to_string())),
        })
    })
}
