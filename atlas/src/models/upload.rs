use std::path::Path;

use crate::error::{AtlasError, Result};
use crate::util::format_file_size;

use super::Settings;

/// A file chosen for upload, held in memory so a failed upload can be
/// retried without reading it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// MIME type is guessed from the file extension.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                AtlasError::Validation(format!("Not a file path: {}", path.display()))
            })?
            .to_string();

        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(filename, bytes))
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Advisory labels only; the backend is what actually enforces limits.
    pub fn check_against(&self, settings: &Settings) -> Vec<String> {
        let mut warnings = Vec::new();

        if !settings.allows_mime(&self.mime_type) {
            warnings.push(format!(
                "{} ({}) is not an accepted file type",
                self.filename, self.mime_type
            ));
        }

        if self.size() > settings.max_file_size {
            warnings.push(format!(
                "{} is {}, above the {} limit",
                self.filename,
                format_file_size(self.size()),
                format_file_size(settings.max_file_size)
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            max_tokens: 1024,
            chunk_size: 800,
            chunk_overlap: 100,
            top_k: 6,
            allowed_mime_types: vec!["application/pdf".to_string(), "text/plain".to_string()],
            max_file_size: 10,
        }
    }

    #[test]
    fn test_mime_type_guessed_from_extension() {
        assert_eq!(
            UploadFile::from_bytes("report.pdf", vec![]).mime_type,
            "application/pdf"
        );
        assert_eq!(
            UploadFile::from_bytes("notes.txt", vec![]).mime_type,
            "text/plain"
        );
        assert_eq!(
            UploadFile::from_bytes("blob", vec![]).mime_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_check_against_settings() {
        let ok = UploadFile::from_bytes("a.pdf", vec![0; 4]);
        assert!(ok.check_against(&settings()).is_empty());

        let bad = UploadFile::from_bytes("a.zip", vec![0; 40]);
        let warnings = bad.check_against(&settings());
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("not an accepted file type"));
        assert!(warnings[1].contains("40 B"));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, "# Guide").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.filename, "guide.md");
        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.size(), 7);
    }
}
