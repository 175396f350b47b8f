//! Lazy text streams and the server-sent-events decoding that feeds them.

use crate::error::{Error, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

/// A finite, single-pass sequence of response text chunks.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Drain a text stream into one string.
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental `text/event-stream` decoder. Bytes may arrive split at any
/// point, including inside a UTF-8 sequence; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line) {
                let is_done = event == SseEvent::Done;
                events.push(event);
                if is_done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        // comments (": keep-alive") and event/id fields carry nothing we use
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return Some(SseEvent::Done);
        }
        if data.is_empty() {
            return None;
        }
        Some(SseEvent::Data(data.to_string()))
    }
}

/// Turn a byte stream of SSE frames into a stream of `data:` payloads,
/// ending at `[DONE]` or when the body closes.
pub fn sse_data<S, B, E>(body: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        body: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        finished: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                return Some((Ok(data), st));
            }
            if st.finished {
                return None;
            }
            let events = match st.body.next().await {
                Some(Ok(bytes)) => st.decoder.feed(bytes.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(Error::stream(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    st.decoder.finish()
                }
            };
            for event in events {
                match event {
                    SseEvent::Data(data) => st.pending.push_back(data),
                    SseEvent::Done => st.finished = true,
                }
            }
        }
    })
    .boxed()
}
