use serde::{Deserialize, Serialize};
use validator::Validate;

/// Read-only configuration the backend exposes at `GET /api/settings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Settings {
    pub max_tokens: u32,
    #[validate(range(min = 1))]
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    #[validate(range(min = 1))]
    pub top_k: u32,
    pub allowed_mime_types: Vec<String>,
    pub max_file_size: u64,
}

impl Settings {
    pub fn allows_mime(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(mime_type.trim()))
    }
}
