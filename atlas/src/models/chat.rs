use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Metadata;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_rag_only")]
    pub rag_only: bool,
}

fn default_rag_only() -> bool {
    true
}

/// A retrieved chunk the backend used to ground an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SourceCitation {
    pub doc_id: String,
    #[serde(default)]
    pub filename: String,
    pub chunk_index: u32,
    #[serde(default)]
    pub snippet: String,
    /// Relevance, usually in `0..=1` but unbounded when the store ranks by distance.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl SourceCitation {
    /// Whether an inline `[filename#chunk]` marker names this source.
    pub fn matches_marker(&self, filename: &str, chunk_index: &str) -> bool {
        self.filename == filename
            && chunk_index
                .parse::<u64>()
                .is_ok_and(|index| index == u64::from(self.chunk_index))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Body returned by `POST /api/chat` when not streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<SourceCitation>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub follow_up: Option<String>,
}

/// One server-sent event payload of a streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamToken {
    pub token: String,
}
