use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::client::DocumentBackend;
use crate::error::ApiError;
use crate::models::{
    DeleteResponse, DocumentInfo, DocumentListResponse, Settings, UploadFile, UploadResponse,
};

/// Scripted backend: each call pops the next queued reply.
#[derive(Default)]
pub struct FakeDocuments {
    pub lists: Mutex<VecDeque<Result<DocumentListResponse, ApiError>>>,
    pub uploads: Mutex<VecDeque<Result<UploadResponse, ApiError>>>,
    pub deletes: Mutex<VecDeque<Result<DeleteResponse, ApiError>>>,
    pub settings: Mutex<VecDeque<Result<Settings, ApiError>>>,
    pub uploaded: Mutex<Vec<(String, Vec<String>)>>,
    pub deleted: Mutex<Vec<String>>,
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, ApiError>>>) -> Result<T, ApiError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ApiError::transport("no reply queued")))
}

#[async_trait]
impl DocumentBackend for FakeDocuments {
    async fn list_documents(&self) -> Result<DocumentListResponse, ApiError> {
        next(&self.lists)
    }

    async fn upload_document(
        &self,
        file: &UploadFile,
        tags: &[String],
    ) -> Result<UploadResponse, ApiError> {
        self.uploaded
            .lock()
            .unwrap()
            .push((file.filename.clone(), tags.to_vec()));
        next(&self.uploads)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<DeleteResponse, ApiError> {
        self.deleted.lock().unwrap().push(doc_id.to_string());
        next(&self.deletes)
    }

    async fn get_settings(&self) -> Result<Settings, ApiError> {
        next(&self.settings)
    }
}

pub fn doc(id: &str, filename: &str, tags: &[&str]) -> DocumentInfo {
    DocumentInfo {
        doc_id: id.to_string(),
        filename: filename.to_string(),
        size: 2048,
        mime_type: "text/markdown".to_string(),
        uploaded_at: Utc::now(),
        chunks: 2,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        metadata: None,
    }
}

pub fn listing(items: Vec<DocumentInfo>) -> DocumentListResponse {
    DocumentListResponse {
        total: items.len() as u64,
        items,
    }
}

pub fn uploaded(doc_id: &str, filename: &str) -> UploadResponse {
    UploadResponse {
        doc_id: doc_id.to_string(),
        filename: filename.to_string(),
        chunks: 3,
        message: "Document uploaded successfully".to_string(),
    }
}
