use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{common::timestamp, Metadata};

/// One uploaded artifact already processed into retrievable chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct DocumentInfo {
    #[validate(length(min = 1))]
    pub doc_id: String,
    #[validate(length(min = 1))]
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub uploaded_at: DateTime<Utc>,
    pub chunks: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DocumentInfo {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Body of `GET /api/docs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct DocumentListResponse {
    #[validate(nested)]
    pub items: Vec<DocumentInfo>,
    pub total: u64,
}

/// Body of `POST /api/docs/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct UploadResponse {
    #[validate(length(min = 1))]
    pub doc_id: String,
    pub filename: String,
    pub chunks: u32,
    #[serde(default = "default_upload_message")]
    pub message: String,
}

/// Body of `DELETE /api/docs/{doc_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct DeleteResponse {
    pub deleted: bool,
    #[serde(default = "default_delete_message")]
    pub message: String,
}

fn default_upload_message() -> String {
    "Document uploaded successfully".to_string()
}

fn default_delete_message() -> String {
    "Document deleted successfully".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_list_parses_naive_timestamps() {
        let json = r#"{
            "items": [{
                "doc_id": "abc",
                "filename": "report.pdf",
                "size": 2048,
                "mime_type": "application/pdf",
                "uploaded_at": "2024-05-01T12:30:00.250000",
                "chunks": 7,
                "tags": ["q3"]
            }],
            "total": 1
        }"#;
        let list: DocumentListResponse = serde_json::from_str(json).unwrap();

        assert_eq!(list.total, 1);
        assert!(list.items[0].has_tag("q3"));
        assert!(list.items[0].metadata.is_none());
        assert!(list.validate().is_ok());
    }

    #[test]
    fn test_empty_doc_id_fails_validation() {
        let json = r#"{"doc_id": "", "filename": "a.txt", "chunks": 1}"#;
        let response: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.message, "Document uploaded successfully");
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_delete_response_default_message() {
        let response: DeleteResponse = serde_json::from_str(r#"{"deleted": true}"#).unwrap();
        assert!(response.deleted);
        assert_eq!(response.message, "Document deleted successfully");
    }
}
