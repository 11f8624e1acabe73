//! Per-stream reader that segments a byte stream into lines

use super::log::LineLog;
use super::types::StreamSource;
use crate::subprocess::ProcessError;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Default capacity of each stream's read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024 * 1024;

const LINE_TERMINATOR: u8 = b'\n';

/// Read `stream` to end-of-stream, publishing each completed line to `log`.
///
/// A read error ends this reader early. Whatever was read before the error is
/// kept, including a trailing fragment, and the error is returned so the
/// coordinator can fold it into the session result.
pub async fn drain<R>(
    stream: R,
    source: StreamSource,
    log: Arc<LineLog>,
    buffer_size: usize,
) -> Result<(), ProcessError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(buffer_size.max(1), stream);

    let result = loop {
        let mut chunk = Vec::new();
        match reader.read_until(LINE_TERMINATOR, &mut chunk).await {
            Ok(0) => break Ok(()),
            Ok(_) if chunk.last() == Some(&LINE_TERMINATOR) => log.complete_line(source, chunk),
            // read_until only stops short of the terminator at end-of-stream
            Ok(_) => log.hold_fragment(source, chunk),
            Err(e) if e.kind() == ErrorKind::Interrupted => log.hold_fragment(source, chunk),
            Err(e) => {
                log.hold_fragment(source, chunk);
                break Err(e);
            }
        }
    };

    log.flush_fragment(source);

    result.map_err(|error| {
        tracing::warn!("Stopped reading {} early: {}", source, error);
        ProcessError::StreamRead {
            stream: source,
            error: Arc::new(error),
        }
    })
}
