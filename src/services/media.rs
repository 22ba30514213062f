//! Media storage for uploaded photos, head images and merge results.
//!
//! Everything lives under a single media root and is referenced from the
//! database by a path relative to that root:
//! - `upload_images/{label}/{uuid}.{ext}` - classified portrait uploads
//! - `merge-image/merged-{id}-head-{slot}.{ext}` - head images of a merge job
//! - `merge-image/merged-{id}-merged.png` - composited results
//! - `background-image/bg{n}.png` - bundled backgrounds

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::config::MediaConfig;
use crate::db::Person;
use crate::{Error, Result};

/// Directory for classified uploads.
pub const UPLOAD_DIR: &str = "upload_images";

/// Directory for merge job inputs and results.
pub const MERGE_DIR: &str = "merge-image";

/// Folder for uploads the classifier returned no label for.
const UNCLASSIFIED: &str = "unclassified";

/// Filesystem-backed media storage.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
    public_url: String,
    max_upload_size: usize,
}

impl MediaStorage {
    /// Create a new media storage rooted at `config.root`.
    pub fn new(config: &MediaConfig, public_url: &str) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            url_prefix: config.url_prefix.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
            max_upload_size: config.max_upload_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// URL prefix the media root is mounted under.
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Resolve a media-relative path to a filesystem path.
    ///
    /// Absolute paths and `..` components are rejected so stored paths can
    /// never point outside the media root.
    pub fn path(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || !safe {
            return Err(Error::InvalidInput(format!("Invalid media path: {}", relative)));
        }
        Ok(self.root.join(rel))
    }

    /// Whether a media-relative file exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Absolute URL a media-relative file is served at.
    pub fn url(&self, relative: &str) -> String {
        format!("{}{}{}", self.public_url, self.url_prefix, relative)
    }

    /// Write bytes to a media-relative path, creating parent directories.
    pub async fn save(&self, relative: &str, data: &[u8]) -> Result<()> {
        let full_path = self.path(relative)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("Failed to create directories: {}", e)))?;
        }

        tokio::fs::write(&full_path, data)
            .await
            .map_err(|e| Error::Internal(format!("Failed to write file: {}", e)))?;

        tracing::debug!(path = %full_path.display(), bytes = data.len(), "Stored media file");
        Ok(())
    }

    /// Read a media-relative file.
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let full_path = self.path(relative)?;
        tokio::fs::read(&full_path)
            .await
            .map_err(|_| Error::NotFound(format!("Media file not found: {}", relative)))
    }

    /// Delete a media-relative file. Failures are logged, never returned.
    pub async fn remove(&self, relative: &str) {
        let Ok(full_path) = self.path(relative) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&full_path).await {
            tracing::warn!("Failed to delete media file {}: {}", full_path.display(), e);
        }
    }
}

/// File extension matching the image format the bytes carry.
///
/// Client file names are never trusted for the stored extension, since it
/// decides the content type the file is later served with.
pub fn image_extension(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
}

/// Folder-safe form of a classifier label.
fn label_folder(label: Option<&str>) -> String {
    let folder: String = label
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if folder.is_empty() || folder.chars().all(|c| c == '_') {
        UNCLASSIFIED.to_string()
    } else {
        folder
    }
}

fn with_extension(stem: &str, data: &[u8]) -> String {
    match image_extension(data) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

/// Storage path for a new upload, sorted into a folder named after its top label.
pub fn upload_image_path(label: Option<&str>, data: &[u8]) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    format!("{}/{}/{}", UPLOAD_DIR, label_folder(label), with_extension(&stem, data))
}

/// Storage path for a merge job's head image.
pub fn head_image_path(job_id: i64, person: Person, data: &[u8]) -> String {
    let stem = format!("merged-{}-head-{}", job_id, person.slot());
    format!("{}/{}", MERGE_DIR, with_extension(&stem, data))
}

/// Storage path for a merge job's composited result.
pub fn result_image_path(job_id: i64) -> String {
    format!("{}/merged-{}-merged.png", MERGE_DIR, job_id)
}

/// Check if an uploaded file looks like an image we can decode.
///
/// The declared content type (or, failing that, the file name) must be an
/// image type, and the bytes must carry a known image signature.
pub fn is_supported_image(content_type: Option<&str>, filename: &str, data: &[u8]) -> bool {
    let declared_image = match content_type {
        Some(ct) if ct != "application/octet-stream" => ct.starts_with("image/"),
        _ => mime_guess::from_path(filename)
            .first()
            .map(|m| m.type_() == mime_guess::mime::IMAGE)
            .unwrap_or(false),
    };

    declared_image && image::guess_format(data).is_ok()
}
