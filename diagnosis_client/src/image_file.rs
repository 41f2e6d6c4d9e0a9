use crate::error::ClientError;
use image::ImageFormat;
use std::path::Path;
use uterine_api::ImageUpload;

const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type from the file's magic bytes, falling back to its extension.
pub fn sniff_content_type(bytes: &[u8], path: &Path) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok())
        .map(|format| format.to_mime_type())
        .unwrap_or(UNKNOWN_CONTENT_TYPE)
}

pub fn load_image(path: &Path) -> Result<ImageUpload, ClientError> {
    let bytes = std::fs::read(path).map_err(|e| {
        ClientError::Validation(format!("cannot read {}: {}", path.display(), e))
    })?;

    let content_type = sniff_content_type(&bytes, path);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();

    tracing::debug!(
        "Loaded {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        content_type
    );

    Ok(ImageUpload::new(bytes, content_type, file_name))
}
