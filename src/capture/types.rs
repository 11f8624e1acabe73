//! Core types shared by the capture engine

use std::fmt;
use std::time::Duration;

/// Stream source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    /// Index of this stream's pending-fragment slot
    pub(crate) fn slot(self) -> usize {
        match self {
            StreamSource::Stdout => 0,
            StreamSource::Stderr => 1,
        }
    }

    pub fn is_stderr(self) -> bool {
        matches!(self, StreamSource::Stderr)
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Stdout => f.write_str("stdout"),
            StreamSource::Stderr => f.write_str("stderr"),
        }
    }
}

/// Point-in-time copy of a session's captured output.
///
/// `lines` keep their terminators exactly as the child emitted them. Bytes
/// that are not valid UTF-8 show up as U+FFFD here; the session's
/// `combined_bytes` and `raw_lines` keep the original bytes. When the
/// snapshot was taken with origins requested, `origins` and `offsets` are
/// index-aligned with `lines`. `offsets` holds the time since the log was
/// created at which each line was appended; it reflects append order only and
/// does not make cross-stream ordering any more precise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub lines: Vec<String>,
    pub origins: Option<Vec<StreamSource>>,
    pub offsets: Option<Vec<Duration>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All lines concatenated in log order
    pub fn combined(&self) -> String {
        self.lines.concat()
    }

    /// Lines that came from `source`, in emission order.
    ///
    /// Returns an empty vector if the snapshot was taken without origins.
    pub fn lines_from(&self, source: StreamSource) -> Vec<&str> {
        let Some(origins) = &self.origins else {
            return Vec::new();
        };
        self.lines
            .iter()
            .zip(origins)
            .filter(|(_, origin)| **origin == source)
            .map(|(line, _)| line.as_str())
            .collect()
    }

    /// True if every line of `earlier` appears unchanged at the same index here
    pub fn extends(&self, earlier: &Snapshot) -> bool {
        earlier.lines.len() <= self.lines.len()
            && earlier
                .lines
                .iter()
                .zip(&self.lines)
                .all(|(before, now)| before == now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(lines: &[&str], origins: &[StreamSource]) -> Snapshot {
        Snapshot {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            origins: Some(origins.to_vec()),
            offsets: None,
        }
    }

    #[test]
    fn test_lines_from_filters_by_origin() {
        use StreamSource::*;
        let snap = snapshot(&["a\n", "x\n", "b\n"], &[Stdout, Stderr, Stdout]);
        assert_eq!(snap.lines_from(Stdout), vec!["a\n", "b\n"]);
        assert_eq!(snap.lines_from(Stderr), vec!["x\n"]);
    }

    #[test]
    fn test_lines_from_without_origins_is_empty() {
        let snap = Snapshot {
            lines: vec!["a\n".to_string()],
            ..Default::default()
        };
        assert!(snap.lines_from(StreamSource::Stdout).is_empty());
    }

    #[test]
    fn test_extends_detects_prefix() {
        use StreamSource::*;
        let early = snapshot(&["a\n"], &[Stdout]);
        let late = snapshot(&["a\n", "b\n"], &[Stdout, Stdout]);
        assert!(late.extends(&early));
        assert!(!early.extends(&late));

        let rewritten = snapshot(&["z\n", "b\n"], &[Stdout, Stdout]);
        assert!(!rewritten.extends(&early));
    }

    #[test]
    fn test_stream_source_display() {
        assert_eq!(StreamSource::Stdout.to_string(), "stdout");
        assert_eq!(StreamSource::Stderr.to_string(), "stderr");
        assert!(StreamSource::Stderr.is_stderr());
    }
}
