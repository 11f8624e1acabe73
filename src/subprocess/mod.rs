//! Process spawning seam used by the capture session.
//!
//! [`ProcessSpawner`] starts an executable with stdout and stderr piped and
//! hands back both streams plus a [`ChildHandle`] for waiting and killing.
//! [`TokioProcessSpawner`] is the real implementation; [`MockProcessSpawner`]
//! scripts output and failures for tests.

pub mod error;
pub mod mock;
pub mod spawner;


pub use error::{FailureKind, ProcessError};
pub use mock::{MockCommandConfig, MockProcessSpawner};
pub use spawner::{
    ChildHandle, ExitStatus, OutputStream, ProcessCommand, ProcessSpawner, SpawnedProcess,
    TokioProcessSpawner,
};
