//! Pipeline error taxonomy
//!
//! `IngestError` classifies what went wrong; `StageFailure` adds where it went wrong
//! (pipeline stage and, for per-segment work, the segment index) and renders the
//! diagnostic record persisted on a failed asset.

use chrono::Utc;
use mam_core::{AppError, ErrorInfo, ErrorMetadata, LogLevel, PipelineStage};
use mam_registry::RegistryError;
use mam_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Caller error, reported synchronously before anything is persisted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[source] AppError),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Registry rejected request with status {status}: {body}")]
    RegistryRejected { status: u16, body: String },

    /// The transcoding tool failed or produced unusable output.
    #[error("Transcode failure: {0}")]
    Transcode(String),

    #[error("Storage failure: {0}")]
    Storage(#[source] StorageError),

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The run's task died without reporting an outcome.
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl IngestError {
    /// Flatten an `anyhow` chain from the transcoding tool into a transcode failure.
    pub fn transcode(err: anyhow::Error) -> Self {
        IngestError::Transcode(format!("{:#}", err))
    }
}

impl From<AppError> for IngestError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidInput(message) => IngestError::InvalidRequest(message),
            other => IngestError::Persistence(other),
        }
    }
}

impl From<RegistryError> for IngestError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable(message) => IngestError::RegistryUnavailable(message),
            RegistryError::Rejected { status, body } => {
                IngestError::RegistryRejected { status, body }
            }
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err)
    }
}

impl ErrorMetadata for IngestError {
    fn error_code(&self) -> &'static str {
        match self {
            IngestError::InvalidRequest(_) => "INVALID_REQUEST",
            IngestError::Persistence(_) => "PERSISTENCE_FAILURE",
            IngestError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
            IngestError::RegistryRejected { .. } => "REGISTRY_REJECTED",
            IngestError::Transcode(_) => "TRANSCODE_FAILURE",
            IngestError::Storage(_) => "STORAGE_FAILURE",
            IngestError::Cancelled => "CANCELLED",
            IngestError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            IngestError::Internal(_) => "INTERNAL_FAILURE",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            IngestError::Persistence(inner) => inner.is_recoverable(),
            IngestError::RegistryUnavailable(_) | IngestError::DeadlineExceeded(_) => true,
            IngestError::Storage(inner) => inner.is_transient(),
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            IngestError::InvalidRequest(_) => LogLevel::Debug,
            IngestError::Cancelled => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

/// A pipeline run stopped at `stage`.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {error}")]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub segment_index: Option<usize>,
    #[source]
    pub error: IngestError,
}

impl StageFailure {
    pub fn new(stage: PipelineStage, error: impl Into<IngestError>) -> Self {
        Self {
            stage,
            segment_index: None,
            error: error.into(),
        }
    }

    pub fn at_segment(mut self, index: usize) -> Self {
        self.segment_index = Some(index);
        self
    }

    /// Reason shown to readers of the asset. Cancellation and deadline expiry are
    /// reported as such whatever stage they interrupted.
    pub fn message(&self) -> &'static str {
        match self.error {
            IngestError::Cancelled => "cancelled",
            IngestError::DeadlineExceeded(_) => "deadline exceeded",
            _ => self.stage.failure_message(),
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        let error = match &self.error {
            IngestError::Persistence(inner) => {
                format!("Persistence failure: {}", inner.detailed_message())
            }
            other => other.to_string(),
        };
        let detail = match self.segment_index {
            Some(index) => format!("segment {}: {}", index, error),
            None => error,
        };

        ErrorInfo {
            message: self.message().to_string(),
            detail,
            occurred_at: Utc::now(),
            stage: self.stage,
            error_code: self.error.error_code().to_string(),
            segment_index: self.segment_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_keep_their_class() {
        let unavailable: IngestError = RegistryError::Unavailable("timed out".into()).into();
        assert_eq!(unavailable.error_code(), "REGISTRY_UNAVAILABLE");
        assert!(unavailable.is_recoverable());

        let rejected: IngestError = RegistryError::Rejected {
            status: 409,
            body: "flow exists".into(),
        }
        .into();
        assert_eq!(rejected.error_code(), "REGISTRY_REJECTED");
        assert!(!rejected.is_recoverable());
    }

    #[test]
    fn test_store_validation_maps_to_invalid_request() {
        let err: IngestError = AppError::InvalidInput("title must not be empty".into()).into();
        assert!(matches!(err, IngestError::InvalidRequest(_)));
        assert_eq!(err.log_level(), LogLevel::Debug);

        let err: IngestError = AppError::NotFound("asset".into()).into();
        assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");
    }

    #[test]
    fn test_stage_failure_diagnostics() {
        let failure = StageFailure::new(
            PipelineStage::UploadSegment,
            StorageError::UploadFailed("403 Forbidden".into()),
        )
        .at_segment(2);
        let info = failure.to_error_info();

        assert_eq!(info.message, "failed to upload segment");
        assert_eq!(info.stage, PipelineStage::UploadSegment);
        assert_eq!(info.segment_index, Some(2));
        assert_eq!(info.error_code, "STORAGE_FAILURE");
        assert!(info.detail.starts_with("segment 2: Storage failure"));
    }

    #[test]
    fn test_cancellation_overrides_stage_message() {
        let cancelled = StageFailure::new(PipelineStage::ExtractMetadata, IngestError::Cancelled);
        assert_eq!(cancelled.message(), "cancelled");
        assert_eq!(cancelled.to_error_info().stage, PipelineStage::ExtractMetadata);

        let expired = StageFailure::new(
            PipelineStage::Segment,
            IngestError::DeadlineExceeded("run deadline reached".into()),
        );
        assert_eq!(expired.message(), "deadline exceeded");
    }

    #[test]
    fn test_persistence_detail_carries_source_chain() {
        let store_error =
            AppError::from(anyhow::anyhow!("connection reset by peer").context("UPDATE assets"));
        let failure =
            StageFailure::new(PipelineStage::PersistMetadata, IngestError::Persistence(store_error));
        let info = failure.to_error_info();

        assert_eq!(info.error_code, "PERSISTENCE_FAILURE");
        assert!(info
            .detail
            .starts_with("Persistence failure: Internal error: UPDATE assets"));
        assert!(info.detail.contains("Caused by: connection reset by peer"));
    }

    #[test]
    fn test_transcode_keeps_cause_chain() {
        let err = IngestError::transcode(
            anyhow::anyhow!("FFmpeg failed: Invalid data found").context("Failed to segment"),
        );
        assert_eq!(
            err.to_string(),
            "Transcode failure: Failed to segment: FFmpeg failed: Invalid data found"
        );
    }
}
