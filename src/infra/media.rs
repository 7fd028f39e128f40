//! Filesystem storage for post images.

use std::fmt::Write as FmtWrite;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed media storage rooted at a configured directory.
///
/// Stored names combine a slugified stem with a content digest prefix so
/// repeated uploads of the same filename never collide.
#[derive(Debug)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    /// Initialise storage rooted at the provided directory, creating it
    /// if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Persist an uploaded image and return its stored path, relative to
    /// the storage root.
    pub async fn store(
        &self,
        original_name: &str,
        payload: Bytes,
    ) -> Result<String, MediaStorageError> {
        if payload.is_empty() {
            return Err(MediaStorageError::EmptyPayload);
        }

        let stored_path = build_stored_path(original_name, &payload);
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, &payload).await?;
        Ok(stored_path)
    }

    /// Read a stored image back by its relative path.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, MediaStorageError> {
        let absolute = self.resolve(stored_path)?;
        let contents = fs::read(absolute).await?;
        Ok(Bytes::from(contents))
    }

    // Reject anything that could escape the storage root.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, MediaStorageError> {
        let relative = Path::new(stored_path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(MediaStorageError::InvalidPath);
        }
        Ok(self.root.join(relative))
    }
}

fn build_stored_path(original_name: &str, payload: &Bytes) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(slugify)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let digest = Sha256::digest(payload);
    let mut prefix = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(prefix, "{byte:02x}");
    }

    match extension {
        Some(ext) if !ext.is_empty() => format!("{prefix}-{stem}.{ext}"),
        _ => format!("{prefix}-{stem}"),
    }
}
