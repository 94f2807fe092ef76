use async_trait::async_trait;
use mam_core::TimeRange;

use crate::error::RegistryError;
use crate::types::{FlowRequest, SourceRequest, StorageAllocation};

/// Remote registry operations used by the ingest pipeline.
///
/// Every call is bounded by a timeout and fails with a typed [`RegistryError`].
#[async_trait]
pub trait Registry: Send + Sync {
    /// Create a source; returns its id.
    async fn create_source(&self, request: &SourceRequest) -> Result<String, RegistryError>;

    /// Create a flow under an existing source; returns its id.
    async fn create_flow(&self, request: &FlowRequest) -> Result<String, RegistryError>;

    /// Allocate storage for one segment of `flow_id`. Never reused across segments.
    async fn allocate_storage(&self, flow_id: &str) -> Result<StorageAllocation, RegistryError>;

    /// Register an uploaded object as the segment covering `range`.
    async fn register_segment(
        &self,
        flow_id: &str,
        object_id: &str,
        range: TimeRange,
    ) -> Result<(), RegistryError>;
}
