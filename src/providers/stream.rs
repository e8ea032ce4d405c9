//! Streaming frame plumbing shared by all provider adapters
//!
//! Providers deliver generation output as line-delimited event frames
//! (SSE `data:` lines or NDJSON). [`LineStream`] turns a raw HTTP byte
//! stream into text lines, buffering partial chunks; [`fragment_stream`]
//! applies a provider-specific frame parser to produce the canonical
//! fragment stream. Dropping the resulting stream drops the underlying
//! response body, which closes the connection.

use crate::error::Result;
use crate::providers::base::{request_error, TextStream};
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome of parsing one event frame.
pub(crate) enum Frame {
    /// An incremental text fragment to yield
    Fragment(String),
    /// Frame carried nothing useful, or failed to parse; drop it
    Skip,
    /// Provider signalled end of stream
    Done,
    /// Frame carried a final fragment and the end-of-stream signal at once
    Final(String),
}

/// Splits an HTTP byte stream into text lines.
///
/// Partial lines are buffered as raw bytes until their terminating
/// newline arrives, so a multi-byte character split across chunk
/// boundaries survives intact; a trailing unterminated line is flushed
/// when the body ends. A line that is not valid UTF-8 is dropped with a
/// warning.
pub(crate) struct LineStream<S> {
    inner: S,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    done: bool,
}

impl<S> LineStream<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(text) = decode_line(&line[..line.len() - 1]) {
                self.ready.push_back(text);
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.trim_end_matches('\r').to_string()),
        Err(_) => {
            tracing::warn!("dropping non-UTF-8 line from provider stream");
            None
        }
    }
}

impl<S> Stream for LineStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.done {
                if !this.buffer.is_empty() {
                    let rest = std::mem::take(&mut this.buffer);
                    if let Some(text) = decode_line(&rest) {
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                return Poll::Ready(None);
            }
            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.push_chunk(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(request_error(err))));
                }
                Poll::Ready(None) => this.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Builds the canonical fragment stream from a line stream and a
/// provider-specific frame parser.
///
/// Parsing stops at the first `Frame::Done` (or after the fragment of a
/// `Frame::Final`); `Frame::Skip` lines are silently dropped so one
/// corrupt frame never terminates the stream.
pub(crate) fn fragment_stream<S>(lines: S, parse: fn(&str) -> Frame) -> TextStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    lines
        .scan(false, move |finished, item| {
            if *finished {
                return futures::future::ready(None);
            }
            let step = match item {
                Err(err) => Some(Some(Err(err))),
                Ok(line) => match parse(&line) {
                    Frame::Fragment(text) => Some(Some(Ok(text))),
                    Frame::Skip => Some(None),
                    Frame::Done => {
                        *finished = true;
                        None
                    }
                    Frame::Final(text) => {
                        *finished = true;
                        Some(Some(Ok(text)))
                    }
                },
            };
            futures::future::ready(step)
        })
        .filter_map(futures::future::ready)
        .boxed()
}

/// Opens a streaming response body as a line stream.
pub(crate) fn response_lines(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    LineStream::new(response.bytes_stream().boxed())
}
