use crate::traits::{Destination, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use mam_core::RetryPolicy;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio_util::io::ReaderStream;

const DEFAULT_SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Uploads with a single `PUT` to a pre-signed URL.
///
/// Transport failures (connection errors, timeouts, 5xx, 408, 429) are retried under
/// the configured policy; any other non-success status fails immediately.
#[derive(Clone)]
pub struct HttpPutStorage {
    client: Client,
    retry: RetryPolicy,
}

impl HttpPutStorage {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, retry })
    }

    async fn put_once(
        &self,
        local_path: &Path,
        destination: &Destination,
        size: u64,
    ) -> StorageResult<()> {
        let file = fs::File::open(local_path)
            .await
            .map_err(|e| StorageError::NotFound(format!("{}: {}", local_path.display(), e)))?;
        let body = Body::wrap_stream(ReaderStream::new(file));
        let content_type = destination
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_SEGMENT_CONTENT_TYPE);

        let response = self
            .client
            .put(&destination.url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("PUT request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_transient_status(status) {
            Err(StorageError::Transport(format!(
                "Destination returned {}: {}",
                status, body
            )))
        } else {
            Err(StorageError::UploadFailed(format!(
                "Destination returned {}: {}",
                status, body
            )))
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl ObjectStorage for HttpPutStorage {
    #[tracing::instrument(skip(self, destination), fields(path = %local_path.display()))]
    async fn upload(&self, local_path: &Path, destination: &Destination) -> StorageResult<u64> {
        let size = fs::metadata(local_path)
            .await
            .map_err(|e| StorageError::NotFound(format!("{}: {}", local_path.display(), e)))?
            .len();
        let start = std::time::Instant::now();

        self.retry
            .retry("storage.put", StorageError::is_transient, || {
                self.put_once(local_path, destination, size)
            })
            .await?;

        tracing::info!(
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Segment upload successful"
        );

        Ok(size)
    }
}
