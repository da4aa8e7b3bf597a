//! Listing image storage
//!
//! Listings keep only an opaque reference per image. An [`ImageStore`]
//! turns uploads into references and references into URLs, either on the
//! Cloudinary CDN or in a local directory served under `/media`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use data_encoding::HEXLOWER;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

use crate::config::ImageConfig;

pub const THUMBNAIL_TRANSFORM: &str = "c_fill,h_200,w_300,q_auto:good,f_auto";
pub const MEDIUM_TRANSFORM: &str = "c_limit,h_400,w_600,q_auto:good,f_auto";
/// Applied once on upload so stored originals stay bounded
const UPLOAD_TRANSFORM: &str = "c_limit,h_600,w_800,q_auto:good,f_auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
    Original,
    Thumbnail,
    Medium,
}

/// One uploaded file as received from a form or read from disk
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Image is too large ({size} bytes, maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Image file is empty")]
    Empty,

    #[error("Image storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Check type and size against the configured limits.
pub fn validate_upload(config: &ImageConfig, upload: &ImageUpload) -> Result<(), ImageError> {
    if upload.bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if !config.is_type_allowed(&upload.content_type) {
        return Err(ImageError::UnsupportedType(upload.content_type.clone()));
    }
    let size = upload.bytes.len() as u64;
    if size > config.max_file_size {
        return Err(ImageError::TooLarge {
            size,
            max: config.max_file_size,
        });
    }
    Ok(())
}

/// Guess a content type from a file extension, for imports from disk
pub fn content_type_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the bytes and return the reference to persist
    async fn upload(&self, upload: ImageUpload) -> Result<String>;

    async fn delete(&self, image_ref: &str) -> Result<()>;

    fn url(&self, image_ref: &str, variant: ImageVariant) -> String;
}

/// Cloudinary when credentials are configured, otherwise the local store.
pub fn image_store_from_config(config: &ImageConfig) -> Result<Arc<dyn ImageStore>> {
    if config.cdn_enabled() {
        Ok(Arc::new(CloudinaryStore::new(config)?))
    } else {
        tracing::info!("Cloudinary not configured, storing images under {:?}", config.upload_dir);
        Ok(Arc::new(LocalImageStore::new(&config.upload_dir, &config.folder)))
    }
}

// ============================================================================
// Cloudinary
// ============================================================================

pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
}

impl CloudinaryStore {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        let cloud_name = config
            .cloud_name
            .clone()
            .ok_or_else(|| anyhow!("Cloudinary cloud name is not configured"))?;
        let client = reqwest::Client::builder()
            .user_agent("Bazaar-Image-Uploader")
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            cloud_name,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("https://api.cloudinary.com/v1_1/{}/image/{}", self.cloud_name, action)
    }

    /// Signature over the alphabetically sorted parameters followed by the secret
    fn sign(&self, params: &[(&str, String)]) -> String {
        sign_params(params, &self.api_secret)
    }
}

pub(crate) fn sign_params(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, upload: ImageUpload) -> Result<String> {
        let timestamp = Utc::now().timestamp().to_string();
        let signed = [
            ("folder", self.folder.clone()),
            ("timestamp", timestamp.clone()),
            ("transformation", UPLOAD_TRANSFORM.to_string()),
        ];
        let signature = self.sign(&signed);

        let file = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.content_type)
            .context("Invalid image content type")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("folder", self.folder.clone())
            .text("timestamp", timestamp)
            .text("transformation", UPLOAD_TRANSFORM)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Cloudinary")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Cloudinary upload failed: {} {}", status, body));
        }
        let uploaded: UploadResponse = response
            .json()
            .await
            .context("Failed to parse Cloudinary response")?;
        Ok(uploaded.public_id)
    }

    async fn delete(&self, image_ref: &str) -> Result<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signed = [
            ("public_id", image_ref.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&signed);
        let form = [
            ("public_id", image_ref.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.api_key.clone()),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];
        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await
            .context("Failed to reach Cloudinary")?;
        if !response.status().is_success() {
            return Err(anyhow!("Cloudinary delete failed: {}", response.status()));
        }
        Ok(())
    }

    fn url(&self, image_ref: &str, variant: ImageVariant) -> String {
        let base = format!("https://res.cloudinary.com/{}/image/upload", self.cloud_name);
        match variant {
            ImageVariant::Original => format!("{}/{}", base, image_ref),
            ImageVariant::Thumbnail => format!("{}/{}/{}", base, THUMBNAIL_TRANSFORM, image_ref),
            ImageVariant::Medium => format!("{}/{}/{}", base, MEDIUM_TRANSFORM, image_ref),
        }
    }
}

// ============================================================================
// Local directory
// ============================================================================

/// Files under `root/<folder>/`, referenced as `<folder>/<uuid>.<ext>`
pub struct LocalImageStore {
    root: PathBuf,
    folder: String,
}

impl LocalImageStore {
    pub fn new(root: &Path, folder: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            folder: folder.trim_matches('/').to_string(),
        }
    }

    /// Resolve a reference inside the root, rejecting anything that escapes it.
    fn path_for(&self, image_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(image_ref);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("Invalid image reference: {}", image_ref));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, upload: ImageUpload) -> Result<String> {
        let dir = self.root.join(&self.folder);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory: {:?}", dir))?;

        let image_ref = format!(
            "{}/{}.{}",
            self.folder,
            Uuid::new_v4(),
            ImageConfig::extension_for(&upload.content_type)
        );
        let path = self.path_for(&image_ref)?;
        fs::write(&path, &upload.bytes)
            .await
            .with_context(|| format!("Failed to save image: {:?}", path))?;
        Ok(image_ref)
    }

    async fn delete(&self, image_ref: &str) -> Result<()> {
        let path = self.path_for(image_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete image: {:?}", path)),
        }
    }

    fn url(&self, image_ref: &str, _variant: ImageVariant) -> String {
        format!("/media/{}", image_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png(bytes: usize) -> ImageUpload {
        ImageUpload {
            filename: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![7; bytes],
        }
    }

    #[test]
    fn test_validate_upload() {
        let config = ImageConfig {
            max_file_size: 10,
            ..Default::default()
        };
        assert!(validate_upload(&config, &png(10)).is_ok());
        assert!(matches!(validate_upload(&config, &png(11)), Err(ImageError::TooLarge { size: 11, max: 10 })));
        assert!(matches!(validate_upload(&config, &png(0)), Err(ImageError::Empty)));

        let mut pdf = png(5);
        pdf.content_type = "application/pdf".to_string();
        assert!(matches!(validate_upload(&config, &pdf), Err(ImageError::UnsupportedType(_))));
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(content_type_for_path(Path::new("x.webp")), "image/webp");
        assert_eq!(content_type_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_cloudinary_urls_and_signature() {
        let config = ImageConfig {
            cloud_name: Some("demo".to_string()),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            ..Default::default()
        };
        let store = CloudinaryStore::new(&config).unwrap();
        assert_eq!(
            store.url("listings/abc", ImageVariant::Thumbnail),
            format!("https://res.cloudinary.com/demo/image/upload/{}/listings/abc", THUMBNAIL_TRANSFORM)
        );
        assert_eq!(
            store.url("listings/abc", ImageVariant::Original),
            "https://res.cloudinary.com/demo/image/upload/listings/abc"
        );

        let forward = sign_params(&[("timestamp", "1".to_string()), ("folder", "x".to_string())], "s");
        let sorted = sign_params(&[("folder", "x".to_string()), ("timestamp", "1".to_string())], "s");
        assert_eq!(forward, sorted);
        assert_eq!(forward.len(), 64);
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path(), "listings");

        let image_ref = store.upload(png(4)).await.unwrap();
        assert!(image_ref.starts_with("listings/") && image_ref.ends_with(".png"));
        assert!(dir.path().join(&image_ref).exists());
        assert_eq!(store.url(&image_ref, ImageVariant::Medium), format!("/media/{}", image_ref));

        store.delete(&image_ref).await.unwrap();
        assert!(!dir.path().join(&image_ref).exists());
        store.delete(&image_ref).await.unwrap();
        assert!(store.delete("../etc/passwd").await.is_err());
    }
}
