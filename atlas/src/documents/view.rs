use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::DocumentBackend;
use crate::config::DocumentsConfig;
use crate::models::{DocumentInfo, Settings};
use crate::util::{DebounceSender, Debouncer};

use super::{all_tags, filter_documents, UploadFlow};

/// A delete waiting for the user to confirm it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub doc_id: String,
    pub filename: String,
    /// Set when the delete was attempted and failed; the prompt stays open.
    pub error: Option<String>,
}

/// Client-side mirror of the document set plus the state of the admin view.
#[derive(Debug)]
pub struct DocumentsView {
    documents: Vec<DocumentInfo>,
    total: u64,
    query: String,
    tag: Option<String>,
    upload: UploadFlow,
    pending_delete: Option<DeleteConfirmation>,
    list_error: Option<String>,
    settings: Option<Settings>,
    query_input: DebounceSender<String>,
    query_debouncer: Debouncer<String>,
    upload_reset: Duration,
}

impl DocumentsView {
    pub fn new(config: &DocumentsConfig) -> Self {
        let (query_input, query_debouncer) = Debouncer::channel(config.filter_debounce());

        Self {
            documents: Vec::new(),
            total: 0,
            query: String::new(),
            tag: None,
            upload: UploadFlow::default(),
            pending_delete: None,
            list_error: None,
            settings: None,
            query_input,
            query_debouncer,
            upload_reset: config.upload_reset(),
        }
    }

    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn list_error(&self) -> Option<&str> {
        self.list_error.as_deref()
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn upload(&self) -> &UploadFlow {
        &self.upload
    }

    pub fn upload_mut(&mut self) -> &mut UploadFlow {
        &mut self.upload
    }

    pub fn pending_delete(&self) -> Option<&DeleteConfirmation> {
        self.pending_delete.as_ref()
    }

    /// Reload the list. On failure the previous documents stay visible and
    /// the error is kept for display.
    pub async fn refresh(&mut self, backend: &dyn DocumentBackend) -> bool {
        match backend.list_documents().await {
            Ok(list) => {
                debug!(items = list.items.len(), total = list.total, "Document list refreshed");
                self.documents = list.items;
                self.total = list.total;
                self.list_error = None;
                true
            }
            Err(e) => {
                warn!("Failed to load documents: {}", e);
                self.list_error = Some(e.message);
                false
            }
        }
    }

    /// Fetch the backend limits used to label uploads. Failure only loses
    /// the labels.
    pub async fn load_settings(&mut self, backend: &dyn DocumentBackend) -> bool {
        match backend.get_settings().await {
            Ok(settings) => {
                self.settings = Some(settings);
                true
            }
            Err(e) => {
                warn!("Failed to load settings: {}", e);
                false
            }
        }
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag.filter(|t| !t.is_empty());
    }

    /// Record a keystroke-level query change; it takes effect once
    /// [`settle_query`](Self::settle_query) sees input go quiet.
    pub fn type_query(&self, query: impl Into<String>) {
        self.query_input.push(query.into());
    }

    /// Handle for pushing query input from another task.
    pub fn query_input(&self) -> DebounceSender<String> {
        self.query_input.clone()
    }

    /// Apply the latest typed query once the debounce delay has passed.
    pub async fn settle_query(&mut self) -> bool {
        match self.query_debouncer.settled().await {
            Some(query) => {
                self.query = query;
                true
            }
            None => false,
        }
    }

    pub fn visible(&self) -> Vec<&DocumentInfo> {
        filter_documents(&self.documents, &self.query, self.tag.as_deref())
    }

    pub fn tags(&self) -> Vec<String> {
        all_tags(&self.documents)
    }

    /// Open a confirmation for `doc_id`. Unknown ids are ignored.
    pub fn request_delete(&mut self, doc_id: &str) -> bool {
        let Some(doc) = self.documents.iter().find(|d| d.doc_id == doc_id) else {
            return false;
        };

        self.pending_delete = Some(DeleteConfirmation {
            doc_id: doc.doc_id.clone(),
            filename: doc.filename.clone(),
            error: None,
        });
        true
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Carry out the pending delete. Success closes the prompt and reloads
    /// the list; failure leaves the prompt open with the error.
    pub async fn confirm_delete(&mut self, backend: &dyn DocumentBackend) -> bool {
        let Some(pending) = self.pending_delete.as_mut() else {
            return false;
        };

        match backend.delete_document(&pending.doc_id).await {
            Ok(response) if response.deleted => {
                info!(doc_id = %pending.doc_id, "{}", response.message);
                self.pending_delete = None;
                self.refresh(backend).await;
                true
            }
            Ok(response) => {
                warn!("Backend did not delete {}: {}", pending.doc_id, response.message);
                pending.error = Some(response.message);
                false
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", pending.doc_id, e);
                pending.error = Some(e.message);
                false
            }
        }
    }

    /// Upload the selected file, then after the reset delay return the
    /// form to idle and reload the list.
    pub async fn submit_upload(&mut self, backend: &dyn DocumentBackend) -> bool {
        if !self.upload.submit(backend).await {
            return false;
        }
        if self.upload.settle(self.upload_reset).await {
            self.refresh(backend).await;
        }
        true
    }
}
