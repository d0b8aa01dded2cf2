//! Typed HTTP boundary to the Atlas backend.
//!
//! Every response body is deserialized and validated before it leaves this
//! module, and every failure is normalized into [`ApiError`].

mod auth;
mod backend;
mod stream;

pub use auth::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use backend::{ChatBackend, DocumentBackend, TokenCallback};
pub use stream::{
    consume_events, parse_event_line, EventLine, LineDecoder, StreamHandle, StreamOutcome,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use validator::Validate;

use crate::config::ClientConfig;
use crate::error::{ApiError, AtlasError, Result};
use crate::models::{
    ChatMessage, ChatRequest, ChatResponse, DeleteResponse, DocumentListResponse, HealthResponse,
    Settings, UploadFile, UploadResponse,
};

#[derive(Clone)]
pub struct AtlasClient {
    http: Client,
    base_url: Url,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for AtlasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_secs", &self.config.timeout_secs)
            .field("read_retries", &self.config.read_retries)
            .finish()
    }
}

impl AtlasClient {
    /// Token storage follows the config: a file when `token_file` is set,
    /// otherwise memory seeded with `api_token`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let tokens: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(MemoryTokenStore::new(config.api_token.clone())),
        };
        Self::with_token_store(config, tokens)
    }

    pub fn with_token_store(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let mut base_url = Url::parse(config.base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(AtlasError::Config(format!(
                "API URL cannot be used as a base: {}",
                config.base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AtlasError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            config: config.clone(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Where the user is sent to sign in again after a 401.
    pub fn login_url(&self) -> String {
        self.base_url
            .join(self.config.login_route.trim_start_matches('/'))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| self.config.login_route.clone())
    }

    pub async fn health(&self) -> std::result::Result<HealthResponse, ApiError> {
        let url = self.endpoint(&["api", "healthz"])?;
        self.get_with_retries(url).await
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        rag_only: bool,
    ) -> std::result::Result<ChatResponse, ApiError> {
        let url = self.endpoint(&["api", "chat"])?;
        let request = ChatRequest {
            messages: messages.to_vec(),
            stream: false,
            rag_only,
        };

        debug!(messages = messages.len(), rag_only, "POST /api/chat");
        let response: ChatResponse = self.send(self.http.post(url).json(&request)).await?;
        debug!(sources = response.sources.len(), "Chat response received");
        Ok(response)
    }

    /// Stream an answer token by token. The request runs on a spawned task;
    /// see [`StreamHandle`] for cancellation.
    pub fn chat_stream<F>(&self, messages: &[ChatMessage], rag_only: bool, on_token: F) -> StreamHandle
    where
        F: FnMut(&str) + Send + 'static,
    {
        let client = self.clone();
        let request = ChatRequest {
            messages: messages.to_vec(),
            stream: true,
            rag_only,
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        StreamHandle::spawn(cancel, async move {
            let url = client.endpoint(&["api", "chat"])?;
            debug!(messages = request.messages.len(), rag_only, "POST /api/chat (stream)");

            let builder = client
                .http
                .post(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&request);

            let response = tokio::select! {
                _ = token.cancelled() => {
                    return Ok(StreamOutcome { answer: String::new(), cancelled: true });
                }
                response = client.execute(builder) => response?,
            };

            consume_events(Box::pin(response.bytes_stream()), token, on_token).await
        })
    }

    pub async fn list_documents(&self) -> std::result::Result<DocumentListResponse, ApiError> {
        let url = self.endpoint(&["api", "docs"])?;
        self.get_with_retries(url).await
    }

    /// Multipart upload. Tags are comma-joined; the field is left out when
    /// there are none.
    pub async fn upload_document(
        &self,
        file: &UploadFile,
        tags: &[String],
    ) -> std::result::Result<UploadResponse, ApiError> {
        let url = self.endpoint(&["api", "docs", "upload"])?;

        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| ApiError::transport(format!("Invalid MIME type {}: {e}", file.mime_type)))?;

        let mut form = multipart::Form::new().part("file", part);
        if !tags.is_empty() {
            form = form.text("tags", tags.join(","));
        }

        debug!(
            filename = %file.filename,
            size = file.size(),
            tags = tags.len(),
            "POST /api/docs/upload"
        );
        self.send(self.http.post(url).multipart(form)).await
    }

    pub async fn delete_document(
        &self,
        doc_id: &str,
    ) -> std::result::Result<DeleteResponse, ApiError> {
        let url = self.endpoint(&["api", "docs", doc_id])?;
        debug!(doc_id, "DELETE /api/docs/{{doc_id}}");
        self.send(self.http.delete(url)).await
    }

    pub async fn get_settings(&self) -> std::result::Result<Settings, ApiError> {
        let url = self.endpoint(&["api", "settings"])?;
        self.get_with_retries(url).await
    }

    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::transport(format!("Invalid API URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_with_retries<T>(&self, url: Url) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let mut attempt: u32 = 0;

        loop {
            match self.send(self.http.get(url.clone())).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.read_retries => {
                    attempt += 1;
                    let delay_ms = 100 * 2_u64.pow(attempt - 1);
                    warn!(
                        "GET {} failed (attempt {}): {}. Retrying in {}ms",
                        url.path(),
                        attempt,
                        error,
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send<T>(&self, builder: RequestBuilder) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let response = self.execute(builder).await?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;

        decode(status, &body)
    }

    /// Attach the bearer token, send, and turn non-2xx into an error.
    async fn execute(&self, builder: RequestBuilder) -> std::result::Result<Response, ApiError> {
        let builder = match self.tokens.load() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| ApiError::from_reqwest(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        debug!(status = status.as_u16(), error = %error, "Request failed");

        if error.is_unauthorized() {
            self.handle_unauthorized();
        }

        Err(error)
    }

    fn handle_unauthorized(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!("Failed to clear stored token: {}", e);
        }
        warn!(
            "Session is no longer authorized; sign in again at {}",
            self.login_url()
        );
    }
}

fn decode<T>(status: StatusCode, body: &[u8]) -> std::result::Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_slice(body).map_err(|e| {
        ApiError::validation(format!("Unexpected response from server: {e}"), status)
    })?;

    value.validate().map_err(|e| {
        ApiError::validation(format!("Response failed validation: {e}"), status)
    })?;

    Ok(value)
}

#[async_trait]
impl ChatBackend for AtlasClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        rag_only: bool,
    ) -> std::result::Result<ChatResponse, ApiError> {
        AtlasClient::chat(self, messages, rag_only).await
    }

    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        rag_only: bool,
        on_token: TokenCallback,
    ) -> StreamHandle {
        AtlasClient::chat_stream(self, messages, rag_only, on_token)
    }
}

#[async_trait]
impl DocumentBackend for AtlasClient {
    async fn list_documents(&self) -> std::result::Result<DocumentListResponse, ApiError> {
        AtlasClient::list_documents(self).await
    }

    async fn upload_document(
        &self,
        file: &UploadFile,
        tags: &[String],
    ) -> std::result::Result<UploadResponse, ApiError> {
        AtlasClient::upload_document(self, file, tags).await
    }

    async fn delete_document(&self, doc_id: &str) -> std::result::Result<DeleteResponse, ApiError> {
        AtlasClient::delete_document(self, doc_id).await
    }

    async fn get_settings(&self) -> std::result::Result<Settings, ApiError> {
        AtlasClient::get_settings(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> AtlasClient {
        AtlasClient::new(&ClientConfig::with_base_url(base_url)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = client("http://localhost:8000");
        assert_eq!(
            client.endpoint(&["api", "docs"]).unwrap().as_str(),
            "http://localhost:8000/api/docs"
        );
    }

    #[test]
    fn test_endpoint_keeps_path_prefix() {
        let client = client("https://example.com/atlas");
        assert_eq!(
            client.endpoint(&["api", "settings"]).unwrap().as_str(),
            "https://example.com/atlas/api/settings"
        );
    }

    #[test]
    fn test_endpoint_encodes_doc_id() {
        let client = client("http://localhost:8000/");
        assert_eq!(
            client.endpoint(&["api", "docs", "a b/c"]).unwrap().as_str(),
            "http://localhost:8000/api/docs/a%20b%2Fc"
        );
    }

    #[test]
    fn test_login_url() {
        let client = client("http://localhost:8000");
        assert_eq!(client.login_url(), "http://localhost:8000/login");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = AtlasClient::new(&ClientConfig::with_base_url("not a url"));
        assert!(matches!(result, Err(AtlasError::UrlParse(_))));

        let result = AtlasClient::new(&ClientConfig::with_base_url("mailto:someone@example.com"));
        assert!(matches!(result, Err(AtlasError::Config(_))));
    }

    #[test]
    fn test_decode_distinguishes_shape_and_validation() {
        let error = decode::<Settings>(StatusCode::OK, br#"{"top_k": 3}"#).unwrap_err();
        assert_eq!(error.kind, crate::error::ApiErrorKind::Validation);
        assert_eq!(error.status, Some(200));

        let body = br#"{"max_tokens": 1, "chunk_size": 0, "chunk_overlap": 0, "top_k": 1,
                        "allowed_mime_types": [], "max_file_size": 1}"#;
        let error = decode::<Settings>(StatusCode::OK, body).unwrap_err();
        assert!(error.message.contains("validation"));
    }
}
