//! # livecap
//!
//! Run a child process and capture its stdout and stderr line by line while
//! it runs, so the output accumulated so far can be inspected at any moment.
//!
//! ## Usage
//!
//! ```bash
//! livecap [-v] [--origin] [--timeout 30s] -- <program> [args..]
//! ```
//!
//! ## Modules
//!
//! - `capture` - Capture session, line log, stream readers and lifecycle
//! - `config` - Capture tuning loaded from TOML and `LIVECAP_*` variables
//! - `error` - Top-level error type with numeric error codes
//! - `subprocess` - Process spawning abstraction with a mock for testing
pub mod capture;
pub mod config;
pub mod error;
pub mod subprocess;

pub use capture::{CaptureSession, LifecycleState, Snapshot, StreamSource};
pub use config::CaptureConfig;
pub use error::LivecapError;
pub use subprocess::ProcessError;
