use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::StreamEvent;

/// Only lines starting with this prefix carry an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// Incremental decoder for the newline-delimited `data: {json}` framing.
///
/// Bytes are buffered until a `\n` arrives, so a frame split across transport
/// chunks (including a split inside a multi-byte character) decodes exactly as
/// if it had arrived in one piece.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    /// Inside an oversized line; everything up to the next `\n` is dropped.
    overflowed: bool,
    decoded: usize,
    malformed: usize,
    skipped: usize,
}

/// Longest line kept while waiting for its `\n`.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            max_line: DEFAULT_MAX_LINE_BYTES,
            overflowed: false,
            decoded: 0,
            malformed: 0,
            skipped: 0,
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(mut self, bytes: usize) -> Self {
        self.max_line = bytes;
        self
    }

    /// Feed one chunk and return every event completed by it, in wire order.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<StreamEvent> {
        if self.overflowed {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.overflowed = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return Vec::new(),
            }
        }

        // Bytes already buffered hold no newline.
        let scanned = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        if let Some(last) = self.buffer[scanned..].iter().rposition(|&b| b == b'\n') {
            let end = scanned + last;
            let complete: Vec<u8> = self.buffer.drain(..=end).collect();
            for line in complete[..end].split(|&b| b == b'\n') {
                if let Some(event) = self.decode_line(line) {
                    events.push(event);
                }
            }
        }

        if self.buffer.len() > self.max_line {
            self.malformed += 1;
            warn!(
                bytes = self.buffer.len(),
                limit = self.max_line,
                "dropping oversized frame"
            );
            self.buffer.clear();
            self.overflowed = true;
        }
        events
    }

    /// Signal end of stream. An unterminated trailing line is never a frame.
    pub fn finish(&mut self) {
        if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated line at end of stream"
            );
        }
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Frames successfully decoded into events.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// `data: ` lines whose payload was not valid JSON.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Valid JSON payloads that are not a known event kind.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let payload = line.strip_prefix(DATA_PREFIX)?;

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, frame = %line, "dropping malformed frame");
                return None;
            }
        };

        match serde_json::from_value::<StreamEvent>(value) {
            Ok(event) => {
                self.decoded += 1;
                Some(event)
            }
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, frame = %line, "ignoring unrecognised frame");
                None
            }
        }
    }
}

/// Adapts a byte stream into a lazy stream of decoded events.
///
/// Ends when the underlying transport ends; a transport error is yielded once
/// and then the stream is exhausted. Not restartable.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    type Item = Result<StreamEvent, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let events = self.decoder.push(&chunk);
                    self.pending.extend(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    self.decoder.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    const WIRE: &str = concat!(
        ": keep-alive\n",
        "data: {\"type\":\"content\",\"content\":\"Héllo \"}\n",
        "\n",
        "event: tool\n",
        "data: {\"type\":\"tool_start\",\"tool\":\"search\",\"args\":{\"q\":\"ümlaut 🌍\"}}\n",
        "data: {\"type\":\"tool_result\",\"tool\":\"search\",\"success\":true,\"result\":\"ok\"}\n",
        "data: {\"type\":\"content\",\"content\":\"wörld\"}\r\n",
        "data: {\"type\":\"complete\",\"session_id\":\"abc123\"}\n\n",
    );

    fn decode_in_chunks(bytes: &[u8], splits: &[usize]) -> Vec<StreamEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        let mut start = 0;
        for &split in splits {
            events.extend(decoder.push(&bytes[start..split]));
            start = split;
        }
        events.extend(decoder.push(&bytes[start..]));
        decoder.finish();
        events
    }

    #[test]
    fn decodes_whole_stream() {
        let events = decode_in_chunks(WIRE.as_bytes(), &[]);
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            StreamEvent::Content {
                content: "Héllo ".into()
            }
        );
        assert_eq!(
            events[1],
            StreamEvent::ToolStart {
                tool: "search".into(),
                args: json!({"q": "ümlaut 🌍"}),
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::Content {
                content: "wörld".into()
            }
        );
        assert!(events[4].is_terminal());
    }

    #[test]
    fn any_single_split_point_yields_same_events() {
        let bytes = WIRE.as_bytes();
        let whole = decode_in_chunks(bytes, &[]);
        for split in 0..=bytes.len() {
            assert_eq!(decode_in_chunks(bytes, &[split]), whole, "split at {split}");
        }
    }

    #[test]
    fn byte_at_a_time_yields_same_events() {
        let bytes = WIRE.as_bytes();
        let whole = decode_in_chunks(bytes, &[]);
        let splits: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(decode_in_chunks(bytes, &splits), whole);
    }

    #[test]
    fn malformed_frame_is_dropped_and_decoding_continues() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {bad json\ndata: {\"type\":\"complete\"}\n");
        assert_eq!(events, vec![StreamEvent::Complete { session_id: None }]);
        assert_eq!(decoder.malformed(), 1);
        assert_eq!(decoder.decoded(), 1);
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder
            .push(b"data: {\"type\":\"content\",\"con")
            .is_empty());
        assert_eq!(decoder.malformed(), 0);
        let events = decoder.push(b"tent\":\"Hi\"}\n");
        assert_eq!(events, vec![StreamEvent::Content { content: "Hi".into() }]);
    }

    #[test]
    fn unprefixed_and_unknown_lines_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b"data:{\"type\":\"content\",\"content\":\"no space\"}\nretry: 3000\ndata: {\"timestamp\":\"x\"}\n",
        );
        assert!(events.is_empty());
        assert_eq!(decoder.malformed(), 0);
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn unterminated_tail_is_discarded_at_finish() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"complete\"}").is_empty());
        decoder.finish();
        assert!(decoder.push(b"\n").is_empty());
        assert_eq!(decoder.decoded(), 0);
    }

    #[test]
    fn many_lines_in_one_chunk() {
        let line = "data: {\"type\":\"content\",\"content\":\"x\"}\n";
        let chunk = line.repeat(10_000);
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(chunk.as_bytes()).len(), 10_000);
        assert_eq!(decoder.decoded(), 10_000);
    }

    #[test]
    fn oversized_line_is_dropped_until_its_newline() {
        let mut decoder = FrameDecoder::new().with_max_line(16);
        assert!(decoder.push(b"data: {\"type\":\"content\",").is_empty());
        assert_eq!(decoder.malformed(), 1);
        assert!(decoder.push(b"\"content\":\"too long\"}").is_empty());

        let events = decoder.push(b"\ndata: {\"type\":\"complete\"}\n");
        assert_eq!(events, vec![StreamEvent::Complete { session_id: None }]);
        assert_eq!(decoder.malformed(), 1);
    }

    #[tokio::test]
    async fn frame_stream_yields_events_then_ends() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",")),
            Ok(Bytes::from_static(b"\"content\":\"Hi\"}\ndata: {\"type\":\"com")),
            Ok(Bytes::from_static(b"plete\"}\n")),
        ];
        let mut stream = FrameStream::new(futures::stream::iter(chunks));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, StreamEvent::Content { content: "Hi".into() });
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second, StreamEvent::Complete { session_id: None });
        assert!(stream.next().await.is_none());
        assert_eq!(stream.decoder().decoded(), 2);
    }

    #[tokio::test]
    async fn frame_stream_surfaces_transport_error_once() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"a\"}\n")),
            Err(TransportError::Stream("connection reset".into())),
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"b\"}\n")),
        ];
        let mut stream = FrameStream::new(futures::stream::iter(chunks));

        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await,
            Some(Err(TransportError::Stream(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
