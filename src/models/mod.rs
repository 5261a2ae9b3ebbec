use crate::services::storage::UploadedFile;
use crate::utils::validation::{ValidationError, normalize_format};
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;

/// A validated, lowercase target format token such as `pdf` or `png`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct TargetFormat(String);

impl TargetFormat {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        normalize_format(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The uploads of one HTTP request plus the format they should be converted to.
#[derive(Debug)]
pub struct ConversionRequest {
    files: Vec<UploadedFile>,
    format: TargetFormat,
}

impl ConversionRequest {
    /// Validate a batch. An empty batch fails with [`ValidationError::NoFiles`]
    /// before the format is looked at.
    pub fn new(files: Vec<UploadedFile>, raw_format: &str) -> Result<Self, ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }
        let format = TargetFormat::parse(raw_format)?;
        Ok(Self { files, format })
    }

    pub fn format(&self) -> &TargetFormat {
        &self.format
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn into_parts(self) -> (Vec<UploadedFile>, TargetFormat) {
        (self.files, self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_format_is_lowercased() {
        let format = TargetFormat::parse("PNG").unwrap();
        assert_eq!(format.as_str(), "png");
        assert_eq!(format.to_string(), "png");
    }

    #[test]
    fn test_empty_request_rejected() {
        let err = ConversionRequest::new(Vec::new(), "pdf").unwrap_err();
        assert_eq!(err, ValidationError::NoFiles);
    }

    #[test]
    fn test_empty_request_wins_over_bad_format() {
        let err = ConversionRequest::new(Vec::new(), "p df").unwrap_err();
        assert_eq!(err, ValidationError::NoFiles);
    }

    #[tokio::test]
    async fn test_bad_format_rejected_with_files() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = crate::services::storage::TransientStorage::new(
            tmp.path().join("uploads"),
            tmp.path().join("output"),
        );
        storage.ensure_roots().await.unwrap();
        let upload = storage.persist_upload(&b"x"[..], "a.txt").await.unwrap();

        let err = ConversionRequest::new(vec![upload], "p df").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat(_)));
        // The rejected batch dropped its upload
        assert_eq!(std::fs::read_dir(storage.uploads_root()).unwrap().count(), 0);
    }
}
