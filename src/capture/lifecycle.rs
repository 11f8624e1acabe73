//! Process lifecycle states and the one-shot completion signal

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Where a capture session is in its run.
///
/// `Created -> Started -> ReadersDraining -> Exited -> Completed`. A session
/// whose child fails to start goes straight from `Created` to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Session exists, nothing spawned yet
    #[default]
    Created,
    /// Child spawned with its output streams piped
    Started,
    /// Both stream readers are running
    ReadersDraining,
    /// Both readers reached end-of-stream; exit status not collected yet
    Exited,
    /// Terminal. Output is frozen and the completion signal has fired.
    Completed,
}

impl LifecycleState {
    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Started, ReadersDraining)
                | (ReadersDraining, Exited)
                | (_, Completed)
        ) && self != Completed
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
            LifecycleState::ReadersDraining => "readers-draining",
            LifecycleState::Exited => "exited",
            LifecycleState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Single-fire event that any number of tasks can wait on
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns false if it had already fired.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| !std::mem::replace(fired, true))
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// A receiver that observes the signal independently of the session
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state plus the completion signal it drives
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    signal: CompletionSignal,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`. Out-of-order transitions are ignored and reported.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_advance_to(next) {
            tracing::warn!("Ignoring lifecycle transition {} -> {}", *state, next);
            return false;
        }
        tracing::trace!("Capture lifecycle {} -> {}", *state, next);
        *state = next;
        true
    }

    /// Enter `Completed` and fire the completion signal, once
    pub fn complete(&self) -> bool {
        self.advance(LifecycleState::Completed) && self.signal.fire()
    }

    pub fn is_complete(&self) -> bool {
        self.signal.is_fired()
    }

    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }
}
