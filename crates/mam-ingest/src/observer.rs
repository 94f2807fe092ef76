//! Observability port for pipeline runs.
//!
//! Injected into the pipeline rather than reached through global state, so tests can
//! record what a run reported.

use mam_core::{AssetStatus, ErrorMetadata, LogLevel, Segment};
use mam_infra::CacheError;
use uuid::Uuid;

use crate::error::StageFailure;

pub trait PipelineObserver: Send + Sync {
    /// A status change was persisted.
    fn on_transition(&self, _asset_id: Uuid, _from: AssetStatus, _to: AssetStatus) {}

    /// The run stopped at a stage. Called before the failure is persisted.
    fn on_failure(&self, _asset_id: Uuid, _failure: &StageFailure) {}

    fn on_segment_registered(&self, _asset_id: Uuid, _segment: &Segment) {}

    fn on_cache_invalidation_failed(&self, _asset_id: Uuid, _error: &CacheError) {}
}

/// Reports pipeline events as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_transition(&self, asset_id: Uuid, from: AssetStatus, to: AssetStatus) {
        tracing::info!(
            asset.id = %asset_id,
            status.from = %from,
            status.to = %to,
            "Asset status changed"
        );
    }

    fn on_failure(&self, asset_id: Uuid, failure: &StageFailure) {
        let code = failure.error.error_code();
        match failure.error.log_level() {
            LogLevel::Debug => tracing::debug!(
                asset.id = %asset_id,
                stage = %failure.stage,
                error_code = code,
                error = %failure.error,
                "Pipeline run failed"
            ),
            LogLevel::Warn => tracing::warn!(
                asset.id = %asset_id,
                stage = %failure.stage,
                error_code = code,
                error = %failure.error,
                "Pipeline run failed"
            ),
            LogLevel::Error => tracing::error!(
                asset.id = %asset_id,
                stage = %failure.stage,
                segment.index = ?failure.segment_index,
                error_code = code,
                recoverable = failure.error.is_recoverable(),
                error = %failure.error,
                "Pipeline run failed"
            ),
        }
    }

    fn on_segment_registered(&self, asset_id: Uuid, segment: &Segment) {
        tracing::debug!(
            asset.id = %asset_id,
            segment.index = segment.index,
            object.id = %segment.object_id,
            timerange = %segment.range,
            "Segment registered"
        );
    }

    fn on_cache_invalidation_failed(&self, asset_id: Uuid, error: &CacheError) {
        tracing::warn!(
            asset.id = %asset_id,
            error = %error,
            "Cache invalidation failed"
        );
    }
}
