use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{info, warn};

use crate::error::{ApiError, Error};

/// Image bytes taken out of a `data:image/<ext>;base64,<payload>` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

pub fn decode_data_uri(value: &str) -> Result<DecodedImage, Error> {
    let invalid = || ApiError::Validation.new("Image must be a base64 encoded data URI");

    let (header, payload) = value
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(invalid)?;

    let extension = header
        .strip_prefix("image/")
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(invalid)?
        .to_lowercase();

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(invalid());
    }

    Ok(DecodedImage { bytes, extension })
}

/// Uploaded files below a root directory, served under `<base_url>/media/`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    base_url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Writes the image under `folder` with a random name and returns its
    /// path relative to the media root.
    pub async fn save(&self, folder: &str, image: &DecodedImage) -> Result<String, Error> {
        let relative = format!("{folder}/{}.{}", uuid::Uuid::new_v4(), image.extension);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                log::error!("Failed to create media folder {parent:?}: {e}");
                ApiError::Internal.default()
            })?;
        }
        tokio::fs::write(&target, &image.bytes).await.map_err(|e| {
            log::error!("Failed to write media file {target:?}: {e}");
            ApiError::Internal.default()
        })?;

        info!("Stored media file {relative}");
        Ok(relative)
    }

    /// Missing files are not an error.
    pub async fn remove(&self, relative: &str) {
        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => info!("Removed media file {relative}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove media file {relative}: {e}"),
        }
    }

    pub fn url(&self, relative: &str) -> String {
        format!("{}/media/{relative}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_png_data_uri() {
        let image = decode_data_uri(PIXEL).unwrap();

        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_malformed_uris() {
        for value in [
            "not an image",
            "data:text/plain;base64,aGVsbG8=",
            "data:image/png;base64,***",
            "data:image/;base64,aGVsbG8=",
            "data:image/png,aGVsbG8=",
        ] {
            let error = decode_data_uri(value).unwrap_err();
            assert_eq!(error.kind, ApiError::Validation, "{value}");
        }
    }

    #[tokio::test]
    async fn save_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStorage::new(dir.path(), "http://localhost:8000/");
        let image = decode_data_uri(PIXEL).unwrap();

        let path = media.save("recipes/images", &image).await.unwrap();
        assert!(path.starts_with("recipes/images/"));
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&path)).unwrap(), image.bytes);
        assert_eq!(
            media.url(&path),
            format!("http://localhost:8000/media/{path}")
        );

        media.remove(&path).await;
        assert!(!dir.path().join(&path).exists());
        media.remove(&path).await;
    }
}
