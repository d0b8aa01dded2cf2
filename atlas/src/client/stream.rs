//! Server-sent-event consumption for streamed chat answers.
//!
//! The backend emits one `data: {"token": "..."}` line per partial token and
//! finishes with the literal `data: [DONE]`. Consumers subscribe with a
//! callback and get back a [`StreamHandle`]; once
//! [`StreamHandle::cancel_and_wait`] returns, the callback is never called
//! again.

use std::fmt::Display;
use std::future::Future;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::StreamToken;

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    Token(String),
    Done,
    /// A `data:` payload that is not a token object.
    Malformed(String),
    /// Blank lines, comments and fields other than `data`.
    Ignored,
}

pub fn parse_event_line(line: &str) -> EventLine {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data:") else {
        return EventLine::Ignored;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == DONE_SENTINEL {
        return EventLine::Done;
    }

    match serde_json::from_str::<StreamToken>(payload) {
        Ok(event) => EventLine::Token(event.token),
        Err(_) => EventLine::Malformed(payload.to_string()),
    }
}

/// Splits a byte stream into lines, tolerating chunk boundaries that fall
/// inside a line or inside a multi-byte character.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever trailing text arrived without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(rest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Every token received, concatenated in arrival order.
    pub answer: String,
    pub cancelled: bool,
}

/// Handle to a running streamed answer.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<StreamOutcome, ApiError>>,
}

impl StreamHandle {
    /// Run `consume` on the tokio runtime under the given cancellation token.
    pub fn spawn<F>(cancel: CancellationToken, consume: F) -> Self
    where
        F: Future<Output = Result<StreamOutcome, ApiError>> + Send + 'static,
    {
        Self {
            cancel,
            task: tokio::spawn(consume),
        }
    }

    /// Ask the stream to stop. Tokens already delivered stay delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<StreamOutcome, ApiError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ApiError::transport(format!("Stream task failed: {e}"))),
        }
    }

    /// Cancel, then wait until the consumer has stopped calling back.
    pub async fn cancel_and_wait(self) -> Result<StreamOutcome, ApiError> {
        self.cancel();
        self.join().await
    }
}

/// Drive an SSE byte stream, invoking `on_token` per token until `[DONE]`,
/// end of stream, or cancellation.
pub async fn consume_events<S, B, E, F>(
    mut body: S,
    cancel: CancellationToken,
    mut on_token: F,
) -> Result<StreamOutcome, ApiError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(&str),
{
    let mut decoder = LineDecoder::default();
    let mut answer = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(received = answer.len(), "Stream cancelled");
                return Ok(StreamOutcome { answer, cancelled: true });
            }
            next = body.next() => next,
        };

        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| ApiError::transport(format!("Stream interrupted: {e}")))?;

        for line in decoder.push(chunk.as_ref()) {
            if apply_line(&line, &cancel, &mut answer, &mut on_token) {
                let cancelled = cancel.is_cancelled();
                return Ok(StreamOutcome { answer, cancelled });
            }
        }
    }

    if let Some(line) = decoder.finish() {
        if apply_line(&line, &cancel, &mut answer, &mut on_token) {
            let cancelled = cancel.is_cancelled();
            return Ok(StreamOutcome { answer, cancelled });
        }
    }

    warn!("Stream ended without a [DONE] event");
    Ok(StreamOutcome {
        answer,
        cancelled: false,
    })
}

/// Returns `true` when consumption must stop.
fn apply_line<F: FnMut(&str)>(
    line: &str,
    cancel: &CancellationToken,
    answer: &mut String,
    on_token: &mut F,
) -> bool {
    match parse_event_line(line) {
        EventLine::Token(token) => {
            if cancel.is_cancelled() {
                return true;
            }
            on_token(&token);
            answer.push_str(&token);
            false
        }
        EventLine::Done => true,
        EventLine::Malformed(payload) => {
            let preview: String = payload.chars().take(80).collect();
            warn!(payload = %preview, "Skipping malformed stream event");
            false
        }
        EventLine::Ignored => false,
    }
}
