use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::models::ErrorBody;

/// Where an [`ApiError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Network failure, timeout, or a non-2xx HTTP status.
    Transport,
    /// The backend answered 2xx but the body did not match the expected shape.
    Validation,
}

/// The single error shape every API client operation fails with.
///
/// Views only ever look at `message` (for display), `status` (for the
/// 401 and retry decisions) and `code` (backend-supplied classification).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Transport,
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn validation(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            kind: ApiErrorKind::Validation,
            message: message.into(),
            status: Some(status.as_u16()),
            code: None,
        }
    }

    /// Build the error for a non-2xx response from its raw body.
    ///
    /// The message prefers the backend's `detail` string, then `error`, then
    /// the `msg` entries of a request-validation detail list, then the raw
    /// body, then the canonical reason phrase.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();

        let message = parsed
            .as_ref()
            .and_then(ErrorBody::message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
            });

        let mut code = parsed.and_then(|b| b.code);
        if code.is_none() && status == StatusCode::UNAUTHORIZED {
            code = Some("unauthorized".to_string());
        }

        Self {
            kind: ApiErrorKind::Transport,
            message,
            status: Some(status.as_u16()),
            code,
        }
    }

    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "Request timed out".to_string()
        } else if error.is_connect() {
            format!("Could not reach the server: {error}")
        } else {
            format!("Request failed: {error}")
        };

        Self {
            kind: ApiErrorKind::Transport,
            message,
            status: error.status().map(|s| s.as_u16()),
            code: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Network failures and 5xx responses are worth another attempt on reads.
    pub fn is_retryable(&self) -> bool {
        match (self.kind, self.status) {
            (ApiErrorKind::Validation, _) => false,
            (ApiErrorKind::Transport, None) => true,
            (ApiErrorKind::Transport, Some(status)) => status >= 500,
        }
    }
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        match &self.detail {
            Some(Value::String(detail)) if !detail.trim().is_empty() => {
                return Some(detail.clone())
            }
            _ => {}
        }

        if let Some(error) = self.error.as_ref().filter(|e| !e.trim().is_empty()) {
            return Some(error.clone());
        }

        // FastAPI request validation: [{"loc": [...], "msg": "...", "type": "..."}]
        if let Some(Value::Array(entries)) = &self.detail {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }

        None
    }
}

#[derive(Error, Debug)]
pub enum AtlasError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
