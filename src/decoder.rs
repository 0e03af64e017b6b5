//! Stream adapter turning upstream byte chunks into decoded JSON events.

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::{debug, warn};

use crate::Error;

/// Largest line we are willing to buffer before giving up on the stream.
const MAX_LINE_BYTES: usize = 1_000_000;

const DATA_FIELD: &str = "data:";

/// How a response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Newline-delimited events, optionally `data: ` prefixed.
    EventStream,
    /// One JSON document.
    Json,
}

impl ResponseFormat {
    /// Pick the framing from the response `Content-Type`, falling back to what was asked for.
    pub fn detect(content_type: Option<&str>, requested_stream: bool) -> Self {
        match content_type.map(|ct| ct.split(';').next().unwrap_or("").trim()) {
            Some("application/json") => ResponseFormat::Json,
            Some("text/event-stream") | Some("application/x-ndjson") => ResponseFormat::EventStream,
            _ if requested_stream => ResponseFormat::EventStream,
            _ => ResponseFormat::Json,
        }
    }
}

/// Result of decoding one complete line.
#[derive(Debug, PartialEq)]
enum Line {
    Skip,
    Event(Value),
    End,
}

fn decode_line(raw: &str, sentinel: Option<&str>) -> Result<Line, Error> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();

    // Blank separators and SSE comments
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return Ok(Line::Skip);
    }

    let payload = if let Some(rest) = trimmed.strip_prefix(DATA_FIELD) {
        rest.strip_prefix(' ').unwrap_or(rest)
    } else if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| trimmed.starts_with(field))
    {
        return Ok(Line::Skip);
    } else {
        trimmed
    };

    // The sentinel wins even when it would also parse as JSON.
    if sentinel.is_some_and(|s| payload.trim() == s) {
        return Ok(Line::End);
    }

    serde_json::from_str(payload)
        .map(Line::Event)
        .map_err(|e| Error::decode(line, e.to_string()))
}

/// Parse a single-document response body.
pub fn decode_document(body: &[u8]) -> Result<Value, Error> {
    serde_json::from_slice(body).map_err(|e| {
        let line = String::from_utf8_lossy(body).into_owned();
        Error::decode(line, e.to_string())
    })
}

/// A stream adapter that parses newline-delimited JSON events from a byte stream.
/// Buffers partial lines across chunks and stops at the sentinel, the first
/// malformed line, or transport close.
pub struct EventStream<S> {
    inner: S,
    /// Bytes of the line currently being received
    buffer: Vec<u8>,
    /// Decoded events ready to be yielded
    events: VecDeque<Value>,
    sentinel: Option<String>,
    /// Error to surface once queued events are drained
    failure: Option<Error>,
    finished: bool,
}

impl<S> EventStream<S> {
    pub fn new(stream: S, sentinel: Option<String>) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
            sentinel,
            failure: None,
            finished: false,
        }
    }

    /// Decode every complete line in the buffer.
    fn parse_buffer(&mut self) {
        let mut start = 0;

        while let Some(pos) = memchr::memchr(b'\n', &self.buffer[start..]) {
            let line_end = start + pos;
            let outcome = std::str::from_utf8(&self.buffer[start..line_end])
                .map_err(|e| {
                    Error::decode(
                        String::from_utf8_lossy(&self.buffer[start..line_end]),
                        format!("invalid UTF-8: {e}"),
                    )
                })
                .and_then(|line| decode_line(line, self.sentinel.as_deref()));
            start = line_end + 1;

            if !self.absorb(outcome) {
                break;
            }
        }

        if self.finished {
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }
    }

    /// Queue a decoded line. Returns false once the stream is over.
    fn absorb(&mut self, outcome: Result<Line, Error>) -> bool {
        match outcome {
            Ok(Line::Skip) => true,
            Ok(Line::Event(value)) => {
                self.events.push_back(value);
                true
            }
            Ok(Line::End) => {
                debug!("end-of-stream sentinel received");
                self.finished = true;
                false
            }
            Err(e) => {
                warn!(error = %e, "malformed stream event");
                self.failure = Some(e);
                self.finished = true;
                false
            }
        }
    }

    /// Decode whatever is left when the transport closes without a final newline.
    fn flush_tail(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let tail = std::mem::take(&mut self.buffer);
        let outcome = std::str::from_utf8(&tail)
            .map_err(|e| {
                Error::decode(String::from_utf8_lossy(&tail), format!("invalid UTF-8: {e}"))
            })
            .and_then(|line| decode_line(line, self.sentinel.as_deref()));
        self.absorb(outcome);
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<Value, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // Yield decoded events in arrival order before anything else
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            if let Some(error) = self.failure.take() {
                return Poll::Ready(Some(Err(error)));
            }

            if self.finished {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.parse_buffer();

                    if !self.finished && self.buffer.len() > MAX_LINE_BYTES {
                        let head = String::from_utf8_lossy(&self.buffer[..256]).into_owned();
                        self.buffer.clear();
                        self.absorb(Err(Error::decode(head, "event line exceeded maximum size")));
                    }
                }
                Some(Err(e)) => {
                    self.buffer.clear();
                    self.failure = Some(e.into());
                    self.finished = true;
                }
                None => {
                    self.flush_tail();
                    self.finished = true;
                }
            }
        }
    }
}

/// Extension trait to decode byte streams as JSON events.
pub trait EventStreamExt: Stream {
    fn json_events(self, sentinel: Option<String>) -> EventStream<Self>
    where
        Self: Sized,
    {
        EventStream::new(self, sentinel)
    }
}

impl<S: Stream> EventStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(bytes::Bytes::copy_from_slice(p)))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(
        parts: &[&[u8]],
        sentinel: Option<&str>,
    ) -> Vec<Result<Value, Error>> {
        chunks(parts)
            .json_events(sentinel.map(str::to_string))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_complete_events() {
        let events = collect(&[b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\n"], None).await;
        let values: Vec<Value> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn test_split_events() {
        let events = collect(
            &[b"data: {\"te", b"xt\":\"Hel", b"lo\"}\n", b"\ndata: {\"text\":", b"\"World\"}\n\n"],
            None,
        )
        .await;
        let values: Vec<Value> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"text": "Hello"}), json!({"text": "World"})]);
    }

    #[tokio::test]
    async fn test_utf8_boundary() {
        // Euro sign is three bytes: E2 82 AC
        let euro = "€".as_bytes();
        let first = [b"data: {\"price\":\"".as_slice(), &euro[..2]].concat();
        let second = [&euro[2..], b"100\"}\n\n"].concat();
        let events = collect(&[&first, &second], None).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &json!({"price": "€100"}));
    }

    #[tokio::test]
    async fn test_sentinel_stops_stream() {
        let events = collect(
            &[b"data: {\"n\":1}\n\ndata: [DONE]\n\ndata: {\"n\":2}\n\n"],
            Some("[DONE]"),
        )
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_sentinel_preempts_valid_json() {
        let events = collect(&[b"data: {\"n\":1}\ndata: {}\ndata: {\"n\":2}\n"], Some("{}")).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let events = collect(
            &[b"data: {\"n\":1}\n\ndata: not json\n\ndata: {\"n\":2}\n\n"],
            Some("[DONE]"),
        )
        .await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        match &events[1] {
            Err(Error::StreamDecode { line, .. }) => assert_eq!(line, "data: not json"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_close_without_final_newline() {
        let events = collect(&[b"data: {\"n\":1}\n\n", b"data: {\"n\":2}"], None).await;
        let values: Vec<Value> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_sse_fields_and_comments_are_skipped() {
        let events = collect(
            &[b": keep-alive\nevent: message_start\nid: 7\ndata: {\"n\":1}\r\n\r\n"],
            None,
        )
        .await;
        let values: Vec<Value> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![json!({"n": 1})]);
    }

    #[tokio::test]
    async fn test_bare_ndjson_lines() {
        let events = collect(&[b"{\"n\":1}\n{\"n\":2}\n"], None).await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_invalid_utf8_error() {
        let events = collect(&[b"data: {\"x\":\"\xFF\xFE\"}\n\n"], None).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(Error::StreamDecode { .. })));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from("data: {\"n\":1}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out")),
            Ok(bytes::Bytes::from("data: {\"n\":2}\n")),
        ];
        let events: Vec<_> = stream::iter(parts).json_events(None).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].as_ref().unwrap_err().is_timeout());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ResponseFormat::detect(Some("application/json; charset=utf-8"), true),
            ResponseFormat::Json
        );
        assert_eq!(
            ResponseFormat::detect(Some("text/event-stream"), false),
            ResponseFormat::EventStream
        );
        assert_eq!(ResponseFormat::detect(None, true), ResponseFormat::EventStream);
        assert_eq!(ResponseFormat::detect(None, false), ResponseFormat::Json);
    }

    #[test]
    fn test_decode_document() {
        assert_eq!(decode_document(b"{\"ok\":true}").unwrap(), json!({"ok": true}));
        assert!(matches!(decode_document(b"<html>"), Err(Error::StreamDecode { .. })));
    }
}
