//! Storage abstraction trait

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The destination refused the upload.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// The destination could not be reached or answered with a transient failure.
    #[error("Storage transport error: {0}")]
    Transport(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether repeating the same upload could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transport(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Where to put one object, as allocated by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub content_type: Option<String>,
}

impl Destination {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn scheme(&self) -> Option<&str> {
        self.url.split_once("://").map(|(scheme, _)| scheme)
    }
}

/// Object storage abstraction
///
/// An upload is a single logical attempt: there is no partial-upload resume.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `local_path` to `destination`; returns the number of bytes sent.
    async fn upload(&self, local_path: &Path, destination: &Destination) -> StorageResult<u64>;
}
