use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncRead;

use super::error::ProcessError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    /// Command for `program` with no arguments, inherited environment and no
    /// timeout beyond the session default
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Set one variable on top of the inherited environment
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the child's process group if it is still running after `timeout`.
    /// Output captured before the kill is kept.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The timeout to enforce: this command's own, else `default`
    pub fn effective_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        self.timeout.or(default)
    }

    /// Program and arguments joined for logs and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            parse_signal_status(status)
        }
    }
}

#[cfg(unix)]
fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => ExitStatus::Signal(signal),
        None => ExitStatus::Error(1),
    }
}

#[cfg(not(unix))]
fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
    ExitStatus::Error(1)
}

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Handle to a running child, used after its output streams are taken
#[async_trait]
pub trait ChildHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Reap the child. Only call once its output streams have been drained.
    async fn wait(&mut self) -> std::io::Result<ExitStatus>;

    /// Ask the child to die without reaping it
    fn kill(&mut self) -> std::io::Result<()>;
}

/// A spawned child with its stdout and stderr pipes
pub struct SpawnedProcess {
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub child: Box<dyn ChildHandle>,
}

/// Starts executables with piped output streams
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &ProcessCommand) -> Result<SpawnedProcess, ProcessError>;
}

/// Production spawner over `tokio::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessSpawner;

impl TokioProcessSpawner {
    /// Log command execution details
    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Executing subprocess: {}", command.display());

        if !command.env.is_empty() {
            tracing::debug!("Environment overrides: {}", command.env.len());
            tracing::trace!("Environment variables: {:?}", command.env);
        }

        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }
    }

    /// Configure the command with environment, working directory and pipes
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Own process group so a kill reaches grandchildren holding our pipes
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Extract a stream from a child process, converting None to error
    fn extract_stream<T>(
        stream: Option<T>,
        stream_name: &str,
        command: &str,
    ) -> Result<T, ProcessError> {
        stream.ok_or_else(|| ProcessError::SpawnFailed {
            command: command.to_string(),
            source: std::sync::Arc::new(std::io::Error::other(format!(
                "Failed to capture {}",
                stream_name
            ))),
        })
    }
}

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(&self, command: &ProcessCommand) -> Result<SpawnedProcess, ProcessError> {
        Self::log_command_start(command);

        let mut child = Self::configure_command(command).spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn '{}': {:?} (kind: {:?})",
                command.program,
                e,
                e.kind()
            );
            ProcessError::from_spawn(e, &command.program, command.display())
        })?;

        let display = command.display();
        let stdout = Self::extract_stream(child.stdout.take(), "stdout", &display)?;
        let stderr = Self::extract_stream(child.stderr.take(), "stderr", &display)?;

        tracing::debug!("Spawned '{}' with pid {:?}", command.program, child.id());

        Ok(SpawnedProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            child: Box::new(TokioChild { child }),
        })
    }
}

struct TokioChild {
    child: tokio::process::Child,
}

#[async_trait]
impl ChildHandle for TokioChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await.map(ExitStatus::from)
    }

    fn kill(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                use nix::sys::signal::{self, Signal};
                use nix::unistd::Pid;

                // Negative pid addresses the whole process group
                let pgid = Pid::from_raw(-(pid as i32));
                if let Err(errno) = signal::kill(pgid, Signal::SIGKILL) {
                    tracing::debug!("Failed to signal process group {}: {}", pid, errno);
                }
            }
        }

        // No reaping here; that waits until both pipes are drained.
        match self.child.start_kill() {
            Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(e),
            _ => Ok(()),
        }
    }
}
