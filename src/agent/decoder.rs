//! Line-oriented event stream decoding
//!
//! The backend writes one `data: <json>` frame per line. Chunks arrive cut at
//! arbitrary byte offsets, so partial lines are carried over to the next
//! chunk and only newline-terminated lines are ever parsed.

use super::{AgentError, AgentEvent};
use bytes::Bytes;
use futures::stream::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

const DATA_PREFIX: &str = "data:";

/// Accumulates raw bytes and hands back complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    /// Bytes before this offset are known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line it completed.
    ///
    /// Lines are split on raw `\n` bytes before any UTF-8 decoding, so a
    /// multi-byte character cut by a chunk boundary is reassembled intact.
    /// Each byte is scanned once, and consumed lines are removed in a single
    /// drain per chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (offset, byte) in self.buffer.iter().enumerate().skip(self.scanned) {
            if *byte != b'\n' {
                continue;
            }
            let mut line = self.buffer.get(start..offset).unwrap_or_default();
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = offset + 1;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Bytes of the trailing line fragment still waiting for its newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Parse one line into an event.
///
/// `Ok(None)` means the line is not a data frame and is ignored.
pub fn parse_line(line: &str) -> Result<Option<AgentEvent>, serde_json::Error> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    serde_json::from_str(payload).map(Some)
}

/// Stream adapter from response body chunks to decoded events.
///
/// Malformed frames are logged and skipped; transport errors are yielded
/// as-is so the caller can end the turn.
pub struct EventDecoder<S> {
    inner: S,
    lines: LineBuffer,
    pending: VecDeque<AgentEvent>,
    skipped: usize,
    done: bool,
}

impl<S> EventDecoder<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            skipped: 0,
            done: false,
        }
    }

    /// Number of data frames dropped because they failed to parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn ingest(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            match parse_line(&line) {
                Ok(Some(event)) => self.pending.push_back(event),
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(error = %e, line = %line, "Skipping malformed event frame");
                }
            }
        }
    }
}

impl<S> Stream for EventDecoder<S>
where
    S: Stream<Item = Result<Bytes, AgentError>> + Unpin,
{
    type Item = Result<AgentEvent, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.ingest(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if self.lines.pending() > 0 {
                        tracing::debug!(
                            bytes = self.lines.pending(),
                            "Discarding unterminated trailing line"
                        );
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
