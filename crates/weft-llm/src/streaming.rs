use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;

use weft_core::error::{Result, WeftError};

/// Incremental parser for `text/event-stream` bodies.
///
/// Events are separated by a blank line; `data:` lines inside one event are
/// joined with `\n`. Bytes are buffered until a full UTF-8 boundary so a
/// multi-byte character split across chunks is never lost.
#[derive(Default)]
pub struct SseParser {
    raw: Vec<u8>,
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes into the parser and drain every complete event.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.raw.extend_from_slice(chunk);
        self.decode();
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Move decoded text from `raw` into `buffer`. Invalid sequences become
    /// U+FFFD; an incomplete trailing sequence stays in `raw`.
    fn decode(&mut self) {
        while !self.raw.is_empty() {
            let (valid, invalid) = match std::str::from_utf8(&self.raw) {
                Ok(s) => (s.len(), None),
                Err(e) => (e.valid_up_to(), e.error_len()),
            };
            if let Ok(text) = std::str::from_utf8(&self.raw[..valid]) {
                self.buffer.push_str(text);
            }
            match invalid {
                Some(n) => {
                    self.raw.drain(..valid + n);
                    self.buffer.push(char::REPLACEMENT_CHARACTER);
                }
                None => {
                    self.raw.drain(..valid);
                    break;
                }
            }
        }
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            // comment / keep-alive
            continue;
        }
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim_start().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val).to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
    })
}

/// A stream of SSE events decoded from an HTTP body.
///
/// Transport errors are surfaced as `LlmStream` items instead of silently
/// ending the stream, so a truncated response is never mistaken for a
/// complete one.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    done: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<SseEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.parser.feed(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(WeftError::LlmStream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    // A final event without its trailing blank line
                    this.pending.extend(this.parser.feed(b"\n\n"));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: message\ndata: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("message"));
        assert_eq!(events[0].data, "{\"x\":1}");
    }

    #[test]
    fn test_sse_parser_chunked() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"x\":").is_empty());
        let events = parser.feed(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn test_sse_parser_split_multibyte_char() {
        let mut parser = SseParser::new();
        let payload = "data: caf\u{e9}\n\n".as_bytes();
        // split inside the two-byte é
        let cut = payload.len() - 3;
        assert!(parser.feed(&payload[..cut]).is_empty());
        let events = parser.feed(&payload[cut..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_sse_parser_skips_comments_and_crlf() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keep-alive\r\n\r\ndata:{\"y\":2}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"y\":2}");
    }

    #[test]
    fn test_sse_parser_invalid_byte_does_not_stall() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: bad\xff byte\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "bad\u{fffd} byte");

        let events = parser.feed(b"data: {\"x\":2}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":2}");
    }

    #[tokio::test]
    async fn test_sse_stream_flushes_trailing_event() {
        use futures::StreamExt;

        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Ok(Bytes::from_static(b"data: b")),
        ];
        let stream = SseStream::new(futures::stream::iter(chunks));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].as_ref().unwrap().data, "b");
    }
}
