use async_trait::async_trait;

use crate::client::StreamHandle;
use crate::error::ApiError;
use crate::models::{
    ChatMessage, ChatResponse, DeleteResponse, DocumentListResponse, Settings, UploadFile,
    UploadResponse,
};

pub type TokenCallback = Box<dyn FnMut(&str) + Send + 'static>;

/// What the chat transcript needs from the backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], rag_only: bool)
        -> Result<ChatResponse, ApiError>;

    /// Start a streamed answer; `on_token` runs once per partial token.
    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        rag_only: bool,
        on_token: TokenCallback,
    ) -> StreamHandle;
}

/// What the document admin view needs from the backend.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn list_documents(&self) -> Result<DocumentListResponse, ApiError>;
    async fn upload_document(
        &self,
        file: &UploadFile,
        tags: &[String],
    ) -> Result<UploadResponse, ApiError>;
    async fn delete_document(&self, doc_id: &str) -> Result<DeleteResponse, ApiError>;
    async fn get_settings(&self) -> Result<Settings, ApiError>;
}
