//! Chat transcript and its request lifecycle.
//!
//! At most one request is in flight per transcript. Failures never escape
//! as errors; they are folded into the conversation as an assistant reply.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ChatBackend, StreamOutcome, TokenCallback};
use crate::error::ApiError;
use crate::models::{ChatMessage, ChatResponse, SourceCitation, TokenUsage};

const CANCELLED_MARKER: &str = "[cancelled]";

/// Opening of the assistant message recorded when a request fails.
pub const FAILURE_PREFIX: &str = "Sorry, I ran into a problem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptState {
    Empty,
    AwaitingResponse,
    Idle,
}

/// A request started by [`Transcript::begin`], to be finished with
/// [`Transcript::complete`].
#[derive(Debug)]
pub struct PendingChat {
    history: Vec<ChatMessage>,
    generation: u64,
}

impl PendingChat {
    /// Everything sent to the backend, ending with the new user message.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.history
    }
}

#[derive(Debug)]
pub struct Transcript {
    session_id: Uuid,
    messages: Vec<ChatMessage>,
    sources: HashMap<usize, Vec<SourceCitation>>,
    state: TranscriptState,
    follow_up: Option<String>,
    usage: TokenUsage,
    last_failure: Option<String>,
    generation: u64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            messages: Vec::new(),
            sources: HashMap::new(),
            state: TranscriptState::Empty,
            follow_up: None,
            usage: TokenUsage::default(),
            last_failure: None,
            generation: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> TranscriptState {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sources attached to the assistant message at `position`.
    pub fn sources_for(&self, position: usize) -> Option<&[SourceCitation]> {
        self.sources.get(&position).map(Vec::as_slice)
    }

    /// Follow-up question suggested with the most recent answer.
    pub fn last_follow_up(&self) -> Option<&str> {
        self.follow_up.as_deref()
    }

    pub fn usage_total(&self) -> TokenUsage {
        self.usage
    }

    /// Error message behind the latest reply, if that request failed.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Append the user's message and hand back the history to send.
    ///
    /// Returns `None` without touching anything for blank input or while a
    /// response is still outstanding.
    pub fn begin(&mut self, input: &str) -> Option<PendingChat> {
        let content = input.trim();
        if content.is_empty() {
            return None;
        }
        if self.state == TranscriptState::AwaitingResponse {
            debug!(session = %self.session_id, "Ignoring submit while awaiting a response");
            return None;
        }

        self.messages.push(ChatMessage::user(content));
        self.state = TranscriptState::AwaitingResponse;
        self.last_failure = None;

        Some(PendingChat {
            history: self.messages.clone(),
            generation: self.generation,
        })
    }

    /// Fold the outcome of `pending` into the transcript.
    pub fn complete(&mut self, pending: PendingChat, result: Result<ChatResponse, ApiError>) {
        if !self.accepts(&pending) {
            return;
        }

        match result {
            Ok(response) => {
                let position = self.messages.len();
                self.messages.push(ChatMessage::assistant(response.answer));
                if !response.sources.is_empty() {
                    self.sources.insert(position, response.sources);
                }
                if let Some(usage) = response.usage {
                    self.usage += usage;
                }
                self.follow_up = response.follow_up.filter(|f| !f.trim().is_empty());
            }
            Err(error) => self.push_failure(&error),
        }

        self.state = TranscriptState::Idle;
    }

    pub async fn submit(&mut self, input: &str, backend: &dyn ChatBackend, rag_only: bool) {
        let Some(pending) = self.begin(input) else {
            return;
        };

        info!(
            session = %self.session_id,
            turns = pending.history.len(),
            rag_only,
            "Sending chat request"
        );
        let result = backend.chat(pending.messages(), rag_only).await;
        self.complete(pending, result);
    }

    /// Like [`submit`](Self::submit) over a streamed answer. `on_token`
    /// sees partial tokens as they arrive; cancelling `cancel` stops the
    /// stream and keeps what was received, marked as cancelled.
    pub async fn submit_streaming(
        &mut self,
        input: &str,
        backend: &dyn ChatBackend,
        rag_only: bool,
        on_token: TokenCallback,
        cancel: CancellationToken,
    ) {
        let Some(pending) = self.begin(input) else {
            return;
        };

        info!(
            session = %self.session_id,
            turns = pending.history.len(),
            rag_only,
            "Streaming chat request"
        );
        let handle = backend.chat_stream(pending.messages(), rag_only, on_token);
        let stream_token = handle.cancellation_token();
        let join = handle.join();
        tokio::pin!(join);

        let finished = tokio::select! {
            result = &mut join => Some(result),
            _ = cancel.cancelled() => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                stream_token.cancel();
                join.await
            }
        };

        self.complete_streamed(pending, result);
    }

    fn complete_streamed(&mut self, pending: PendingChat, result: Result<StreamOutcome, ApiError>) {
        if !self.accepts(&pending) {
            return;
        }

        match result {
            Ok(outcome) if outcome.cancelled => {
                let content = if outcome.answer.is_empty() {
                    CANCELLED_MARKER.to_string()
                } else {
                    format!("{} {CANCELLED_MARKER}", outcome.answer)
                };
                info!(session = %self.session_id, "Streamed answer cancelled");
                self.messages.push(ChatMessage::assistant(content));
            }
            Ok(outcome) => self.messages.push(ChatMessage::assistant(outcome.answer)),
            Err(error) => self.push_failure(&error),
        }

        self.follow_up = None;
        self.state = TranscriptState::Idle;
    }

    /// Discard the conversation. A response still in flight is dropped
    /// when it arrives.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.sources.clear();
        self.follow_up = None;
        self.last_failure = None;
        self.state = TranscriptState::Empty;
        self.generation += 1;
    }

    fn accepts(&self, pending: &PendingChat) -> bool {
        let current = pending.generation == self.generation
            && self.state == TranscriptState::AwaitingResponse;
        if !current {
            debug!(session = %self.session_id, "Dropping response for a cleared transcript");
        }
        current
    }

    fn push_failure(&mut self, error: &ApiError) {
        warn!(session = %self.session_id, "Chat request failed: {}", error);
        self.messages.push(ChatMessage::assistant(format!(
            "{FAILURE_PREFIX}: {}",
            error.message
        )));
        self.last_failure = Some(error.message.clone());
    }
}
