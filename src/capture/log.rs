//! Shared line log written by the stream readers and copied by observers.
//!
//! Every mutation and every copy takes the one lock for exactly as long as
//! the operation needs. Nothing in here blocks on I/O.

use super::types::{Snapshot, StreamSource};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Append-only record of completed lines, tagged by origin stream
#[derive(Debug)]
pub struct LineLog {
    inner: Mutex<LogInner>,
    created: Instant,
}

#[derive(Debug, Default)]
struct LogInner {
    /// Raw bytes as the child wrote them, terminator included
    lines: Vec<Vec<u8>>,
    origins: Vec<StreamSource>,
    offsets: Vec<Duration>,
    /// Partial line per stream, indexed by `StreamSource::slot`
    pending: [Option<Vec<u8>>; 2],
    frozen: bool,
}

impl LogInner {
    fn push(&mut self, source: StreamSource, line: Vec<u8>, offset: Duration) {
        self.lines.push(line);
        self.origins.push(source);
        self.offsets.push(offset);
    }
}

impl LineLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
            created: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        // A reader that panicked mid-append cannot leave the vectors misaligned,
        // since each push happens under one guard.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append the tail of a line (terminator included), joining it to any
    /// pending fragment held for `source`.
    pub fn complete_line(&self, source: StreamSource, tail: Vec<u8>) {
        let offset = self.created.elapsed();
        let mut inner = self.lock();
        if inner.frozen {
            tracing::warn!("Dropping {} line appended after completion", source);
            return;
        }
        let line = match inner.pending[source.slot()].take() {
            Some(mut fragment) => {
                fragment.extend_from_slice(&tail);
                fragment
            }
            None => tail,
        };
        tracing::trace!("Captured {} line ({} bytes)", source, line.len());
        inner.push(source, line, offset);
    }

    /// Hold a terminator-less fragment for `source` until the rest of the
    /// line arrives or the stream ends. Empty fragments are ignored.
    pub fn hold_fragment(&self, source: StreamSource, fragment: Vec<u8>) {
        if fragment.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.pending[source.slot()]
            .get_or_insert_with(Vec::new)
            .extend_from_slice(&fragment);
    }

    /// Flush the pending fragment for `source` as a final terminator-less line.
    ///
    /// Returns true if a line was appended.
    pub fn flush_fragment(&self, source: StreamSource) -> bool {
        let offset = self.created.elapsed();
        let mut inner = self.lock();
        let Some(fragment) = inner.pending[source.slot()].take() else {
            return false;
        };
        if fragment.is_empty() || inner.frozen {
            return false;
        }
        tracing::trace!(
            "Flushed trailing {} fragment ({} bytes)",
            source,
            fragment.len()
        );
        inner.push(source, fragment, offset);
        true
    }

    /// Whether `source` currently has a partial line held back
    pub fn has_pending(&self, source: StreamSource) -> bool {
        self.lock().pending[source.slot()].is_some()
    }

    /// Reject any further appends
    pub fn freeze(&self) {
        self.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the log. Lines are decoded as UTF-8, with invalid sequences
    /// replaced by U+FFFD; use [`raw_lines`](Self::raw_lines) for the exact
    /// bytes. Origins and offsets are copied only when asked for.
    pub fn snapshot(&self, include_origin: bool) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            lines: inner
                .lines
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect(),
            origins: include_origin.then(|| inner.origins.clone()),
            offsets: include_origin.then(|| inner.offsets.clone()),
        }
    }

    /// All completed lines concatenated in log order
    pub fn combined_bytes(&self) -> Vec<u8> {
        self.lock().lines.concat()
    }

    /// Copy of every completed line exactly as the child wrote it
    pub fn raw_lines(&self) -> Vec<Vec<u8>> {
        self.lock().lines.clone()
    }
}

impl Default for LineLog {
    fn default() -> Self {
        Self::new()
    }
}
