use async_trait::async_trait;
use mam_core::error::AppError;
use mam_core::models::{Asset, AssetStatus, ErrorInfo};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Asset persistence used by the ingest pipeline.
///
/// Implementations give per-row atomicity only; nothing spans a whole pipeline run.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist a new asset and return its id.
    async fn create_asset(&self, asset: &Asset) -> Result<Uuid, AppError>;

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Move the asset to `status`.
    ///
    /// Fails with [`AppError::InvalidTransition`] if the move is not legal from the
    /// persisted status. Reaching `ready` clears any recorded diagnostics.
    async fn update_status(&self, id: Uuid, status: AssetStatus) -> Result<(), AppError>;

    /// Record registry identifiers. Each identifier can be set once; writing the same
    /// value again is a no-op, writing a different one fails with
    /// [`AppError::ExternalIdsAlreadySet`]. `flow_id = None` leaves the flow untouched.
    async fn update_external_ids(
        &self,
        id: Uuid,
        source_id: &str,
        flow_id: Option<&str>,
    ) -> Result<(), AppError>;

    async fn update_error_info(&self, id: Uuid, error_info: &ErrorInfo) -> Result<(), AppError>;

    /// Set `metadata[key] = value` without touching other keys; returns the merged document.
    async fn merge_metadata(
        &self,
        id: Uuid,
        key: &str,
        value: JsonValue,
    ) -> Result<JsonValue, AppError>;
}

/// Statuses from which `next` may be entered.
pub(crate) fn predecessors_of(next: AssetStatus) -> Vec<AssetStatus> {
    [
        AssetStatus::New,
        AssetStatus::Ingesting,
        AssetStatus::Processing,
        AssetStatus::Ready,
        AssetStatus::Failed,
    ]
    .into_iter()
    .filter(|s| s.can_transition_to(next))
    .collect()
}
