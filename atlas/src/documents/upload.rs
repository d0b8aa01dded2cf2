use std::time::Duration;

use tracing::{info, warn};

use crate::client::DocumentBackend;
use crate::models::{Settings, UploadFile, UploadResponse};

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    /// A failed upload lands back here with the file kept for a retry.
    FileSelected {
        file: UploadFile,
        error: Option<String>,
    },
    Uploading {
        file: UploadFile,
    },
    Succeeded {
        response: UploadResponse,
    },
}

/// Upload form: one selected file plus a free-text tag field.
#[derive(Debug)]
pub struct UploadFlow {
    state: UploadState,
    tags_input: String,
}

impl Default for UploadFlow {
    fn default() -> Self {
        Self {
            state: UploadState::Idle,
            tags_input: String::new(),
        }
    }
}

impl UploadFlow {
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn tags_input(&self) -> &str {
        &self.tags_input
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.state, UploadState::Uploading { .. })
    }

    pub fn selected_file(&self) -> Option<&UploadFile> {
        match &self.state {
            UploadState::FileSelected { file, .. } | UploadState::Uploading { file } => Some(file),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            UploadState::FileSelected { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// Choose a file, replacing any previous choice or error. Ignored while
    /// an upload is running.
    pub fn select(&mut self, file: UploadFile) -> bool {
        if self.is_uploading() {
            return false;
        }
        self.state = UploadState::FileSelected { file, error: None };
        true
    }

    pub fn set_tags_input(&mut self, text: impl Into<String>) {
        self.tags_input = text.into();
    }

    /// Labels for the selected file against the backend's advertised limits.
    pub fn warnings(&self, settings: &Settings) -> Vec<String> {
        self.selected_file()
            .map(|file| file.check_against(settings))
            .unwrap_or_default()
    }

    /// Upload the selected file. Returns `true` on success; on failure the
    /// backend's message is kept on the still-selected file.
    pub async fn submit(&mut self, backend: &dyn DocumentBackend) -> bool {
        let file = match std::mem::replace(&mut self.state, UploadState::Idle) {
            UploadState::FileSelected { file, .. } => file,
            other => {
                self.state = other;
                return false;
            }
        };

        let tags = parse_tags(&self.tags_input);
        self.state = UploadState::Uploading { file: file.clone() };

        match backend.upload_document(&file, &tags).await {
            Ok(response) => {
                info!(
                    doc_id = %response.doc_id,
                    chunks = response.chunks,
                    "Uploaded {}",
                    response.filename
                );
                self.state = UploadState::Succeeded { response };
                true
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", file.filename, e);
                self.state = UploadState::FileSelected {
                    file,
                    error: Some(e.message),
                };
                false
            }
        }
    }

    /// After a success, wait out `delay` and return to idle. Returns `true`
    /// when the document list should be refreshed.
    pub async fn settle(&mut self, delay: Duration) -> bool {
        if !matches!(self.state, UploadState::Succeeded { .. }) {
            return false;
        }

        tokio::time::sleep(delay).await;
        self.state = UploadState::Idle;
        self.tags_input.clear();
        true
    }
}

/// Split comma-separated tags, trimming each and dropping blanks and
/// repeats (first occurrence wins).
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::fake::{uploaded, FakeDocuments};
    use crate::error::ApiError;
    use pretty_assertions::assert_eq;

    fn file(name: &str) -> UploadFile {
        UploadFile::from_bytes(name, b"# heading".to_vec())
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags(" a, b ,a,, c "), vec!["a", "b", "c"]);
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ,").is_empty());
        assert_eq!(parse_tags("Q3,q3"), vec!["Q3", "q3"]);
    }

    #[test]
    fn test_select_replaces_previous_choice() {
        let mut flow = UploadFlow::default();
        assert!(flow.select(file("a.md")));
        assert!(flow.select(file("b.md")));
        assert_eq!(flow.selected_file().map(|f| f.filename.as_str()), Some("b.md"));
        assert!(flow.error().is_none());
    }

    #[tokio::test]
    async fn test_submit_without_file_does_nothing() {
        let backend = FakeDocuments::default();
        let mut flow = UploadFlow::default();

        assert!(!flow.submit(&backend).await);
        assert_eq!(flow.state(), &UploadState::Idle);
        assert!(backend.uploaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_parsed_at_submit_time() {
        let backend = FakeDocuments::default();
        backend
            .uploads
            .lock()
            .unwrap()
            .push_back(Ok(uploaded("d9", "notes.md")));
        let mut flow = UploadFlow::default();

        flow.select(file("notes.md"));
        flow.set_tags_input("draft");
        flow.set_tags_input(" draft, q3 ,draft ");
        assert!(flow.submit(&backend).await);

        assert_eq!(
            *backend.uploaded.lock().unwrap(),
            vec![(
                "notes.md".to_string(),
                vec!["draft".to_string(), "q3".to_string()]
            )]
        );
        assert!(matches!(flow.state(), UploadState::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_failure_keeps_file_and_message_verbatim() {
        let backend = FakeDocuments::default();
        backend.uploads.lock().unwrap().push_back(Err(ApiError::from_status(
            reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE,
            r#"{"detail": "File type image/png not allowed"}"#,
        )));
        let mut flow = UploadFlow::default();

        flow.select(file("scan.png"));
        assert!(!flow.submit(&backend).await);

        assert_eq!(flow.error(), Some("File type image/png not allowed"));
        assert_eq!(flow.selected_file().map(|f| f.filename.as_str()), Some("scan.png"));
        assert_eq!(backend.uploaded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_failure_uses_same_file() {
        let backend = FakeDocuments::default();
        {
            let mut uploads = backend.uploads.lock().unwrap();
            uploads.push_back(Err(ApiError::transport("Connection refused")));
            uploads.push_back(Ok(uploaded("d1", "manual.pdf")));
        }
        let mut flow = UploadFlow::default();

        flow.select(file("manual.pdf"));
        assert!(!flow.submit(&backend).await);
        assert!(flow.submit(&backend).await);
        assert_eq!(backend.uploaded.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_settle_resets_after_success() {
        let backend = FakeDocuments::default();
        backend
            .uploads
            .lock()
            .unwrap()
            .push_back(Ok(uploaded("d1", "a.md")));
        let mut flow = UploadFlow::default();

        assert!(!flow.settle(Duration::from_millis(1)).await);

        flow.select(file("a.md"));
        flow.set_tags_input("x");
        flow.submit(&backend).await;

        assert!(flow.settle(Duration::from_millis(10)).await);
        assert_eq!(flow.state(), &UploadState::Idle);
        assert_eq!(flow.tags_input(), "");
    }
}
