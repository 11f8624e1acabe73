//! Incremental capture of a child process's stdout and stderr.
//!
//! A [`CaptureSession`] spawns a child, runs one reader per output stream and
//! appends each completed line to a shared [`LineLog`] tagged with its
//! [`StreamSource`]. Other tasks and threads can call
//! [`CaptureSession::snapshot`] at any time to see what has accumulated,
//! including while the child is still running.
//!
//! The child is only reaped after both readers reach end-of-stream, so no
//! trailing output still sitting in a pipe is lost.

pub mod lifecycle;
pub mod log;
pub mod reader;
pub mod session;
pub mod types;

#[cfg(test)]
mod tests;

pub use lifecycle::{CompletionSignal, LifecycleState};
pub use log::LineLog;
pub use session::CaptureSession;
pub use types::{Snapshot, StreamSource};
