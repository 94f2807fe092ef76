use crate::traits::{Destination, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage for `file://<key>` destinations.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path`, creating it if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a destination key to a path below the root, rejecting anything that
    /// could escape it.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidDestination(format!(
                "Storage key contains invalid characters: {}",
                key
            )));
        }

        let path = self.base_path.join(key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidDestination(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }
        Ok(path)
    }

    fn destination_key<'a>(&self, destination: &'a Destination) -> StorageResult<&'a str> {
        destination.url.strip_prefix("file://").ok_or_else(|| {
            StorageError::InvalidDestination(format!(
                "Local storage only accepts file:// destinations, got {}",
                destination.url
            ))
        })
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(&self, local_path: &Path, destination: &Destination) -> StorageResult<u64> {
        let key = self.destination_key(destination)?;
        let path = self.key_to_path(key)?;

        if !fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(local_path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let start = std::time::Instant::now();
        let size = fs::copy(local_path, &path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_copies_file_under_root() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let segment = work.path().join("segment_0000.ts");
        fs::write(&segment, b"0123456789").await.unwrap();

        let storage = LocalStorage::new(root.path()).await.unwrap();
        let size = storage
            .upload(&segment, &Destination::new("file://flows/f1/obj-0.ts"))
            .await
            .unwrap();

        assert_eq!(size, 10);
        let stored = fs::read(root.path().join("flows/f1/obj-0.ts")).await.unwrap();
        assert_eq!(stored, b"0123456789");
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_foreign_schemes() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let segment = work.path().join("segment_0000.ts");
        fs::write(&segment, b"x").await.unwrap();
        let storage = LocalStorage::new(root.path()).await.unwrap();

        for url in ["file://../escape.ts", "file:///etc/passwd", "https://x/y"] {
            let err = storage
                .upload(&segment, &Destination::new(url))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidDestination(_)), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let root = TempDir::new().unwrap();
        let storage = LocalStorage::new(root.path()).await.unwrap();
        let err = storage
            .upload(
                Path::new("/nonexistent/segment.ts"),
                &Destination::new("file://a.ts"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
