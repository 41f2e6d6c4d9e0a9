use crate::Covariates;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
}

impl ImageUpload {
    pub fn new(
        bytes: impl Into<Bytes>,
        content_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One submission: the image is required by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub image: ImageUpload,
    pub covariates: Covariates,
}

impl UploadRequest {
    pub fn new(image: ImageUpload, covariates: Covariates) -> Self {
        Self { image, covariates }
    }
}
