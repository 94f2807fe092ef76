#[cfg(feature = "storage-http")]
use crate::HttpPutStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::{Destination, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use mam_core::PipelineConfig;
use std::path::Path;
use std::sync::Arc;

/// Dispatches each upload to the backend matching the destination's URL scheme.
#[derive(Clone, Default)]
pub struct StorageRouter {
    http: Option<Arc<dyn ObjectStorage>>,
    local: Option<Arc<dyn ObjectStorage>>,
}

impl StorageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, backend: Arc<dyn ObjectStorage>) -> Self {
        self.http = Some(backend);
        self
    }

    pub fn with_local(mut self, backend: Arc<dyn ObjectStorage>) -> Self {
        self.local = Some(backend);
        self
    }

    fn backend_for(&self, destination: &Destination) -> StorageResult<&Arc<dyn ObjectStorage>> {
        let backend = match destination.scheme() {
            Some("http") | Some("https") => self.http.as_ref(),
            Some("file") => self.local.as_ref(),
            _ => None,
        };
        backend.ok_or_else(|| {
            StorageError::InvalidDestination(format!(
                "No storage backend configured for {}",
                destination.url
            ))
        })
    }
}

#[async_trait]
impl ObjectStorage for StorageRouter {
    async fn upload(&self, local_path: &Path, destination: &Destination) -> StorageResult<u64> {
        self.backend_for(destination)?
            .upload(local_path, destination)
            .await
    }
}

/// Create the storage backend described by the pipeline configuration.
pub async fn create_storage(config: &PipelineConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    #[allow(unused_mut)]
    let mut router = StorageRouter::new();

    #[cfg(feature = "storage-http")]
    {
        let http = HttpPutStorage::new(config.storage_timeout, config.storage_retry)?;
        router = router.with_http(Arc::new(http));
    }

    match &config.local_storage_root {
        #[cfg(feature = "storage-local")]
        Some(root) => {
            let local = LocalStorage::new(root.clone()).await?;
            router = router.with_local(Arc::new(local));
        }
        #[cfg(not(feature = "storage-local"))]
        Some(_) => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
        None => {}
    }

    Ok(Arc::new(router))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_scheme_is_rejected() {
        let router = StorageRouter::new();
        let err = router
            .upload(Path::new("/tmp/x.ts"), &Destination::new("s3://bucket/key"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDestination(_)));
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_routes_file_destinations_to_local_root() {
        let root = tempfile::TempDir::new().unwrap();
        let work = tempfile::TempDir::new().unwrap();
        let segment = work.path().join("segment_0000.ts");
        tokio::fs::write(&segment, b"abc").await.unwrap();

        let config = PipelineConfig {
            local_storage_root: Some(root.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        let storage = create_storage(&config).await.unwrap();
        let size = storage
            .upload(&segment, &Destination::new("file://obj.ts"))
            .await
            .unwrap();
        assert_eq!(size, 3);
        assert!(root.path().join("obj.ts").exists());
    }
}
