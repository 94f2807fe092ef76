//! Asset lifecycle state machine driven by one detached run per asset.

use mam_core::{
    technical_metadata_key, Asset, AssetStatus, PipelineConfig, PipelineStage, ProcessRequest,
    TranscodeConfig,
};
use mam_db::AssetStore;
use mam_infra::CacheInvalidator;
use mam_processing::Transcoder;
use mam_registry::{FlowRequest, Registry, SourceRequest};
use mam_storage::ObjectStorage;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{IngestError, StageFailure};
use crate::observer::{PipelineObserver, TracingObserver};
use crate::processing::ProcessingStage;
use crate::scope::RunScope;

/// External systems a pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn AssetStore>,
    pub cache: Arc<dyn CacheInvalidator>,
    pub registry: Arc<dyn Registry>,
    pub transcoder: Arc<dyn Transcoder>,
    pub storage: Arc<dyn ObjectStorage>,
    pub observer: Arc<dyn PipelineObserver>,
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn AssetStore>,
        cache: Arc<dyn CacheInvalidator>,
        registry: Arc<dyn Registry>,
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            transcoder,
            storage,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }
}

pub struct Pipeline {
    store: Arc<dyn AssetStore>,
    cache: Arc<dyn CacheInvalidator>,
    registry: Arc<dyn Registry>,
    observer: Arc<dyn PipelineObserver>,
    processing: ProcessingStage,
    call_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        collaborators: Collaborators,
        transcode: &TranscodeConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        let processing = ProcessingStage::new(
            collaborators.transcoder,
            collaborators.registry.clone(),
            collaborators.storage,
            collaborators.observer.clone(),
            transcode,
            pipeline,
        );

        Self {
            store: collaborators.store,
            cache: collaborators.cache,
            registry: collaborators.registry,
            observer: collaborators.observer,
            processing,
            call_timeout: pipeline.external_call_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    /// Drive `asset` from `new` to a terminal status and return that status.
    ///
    /// Failures never escape: they are persisted as the asset's diagnostics and the
    /// asset is moved to `failed`.
    #[tracing::instrument(skip_all, fields(asset.id = %asset.id, asset.type = %asset.asset_type))]
    pub async fn run(&self, asset: Asset, source_path: PathBuf, scope: &RunScope) -> AssetStatus {
        let start = Instant::now();
        let mut current = asset.status;

        match self.drive(&asset, source_path, scope, &mut current).await {
            Ok(()) => {
                tracing::info!(
                    asset.id = %asset.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Pipeline run completed"
                );
                current
            }
            Err(failure) => self.record_failure(asset.id, current, failure).await,
        }
    }

    async fn drive(
        &self,
        asset: &Asset,
        source_path: PathBuf,
        scope: &RunScope,
        current: &mut AssetStatus,
    ) -> Result<(), StageFailure> {
        let asset_id = asset.id;
        self.transition(asset_id, current, AssetStatus::Ingesting, scope)
            .await?;

        let format = asset.asset_type.format_urn().to_string();
        let source_request = SourceRequest {
            label: asset.title.clone(),
            format: format.clone(),
            description: asset.description.clone(),
        };
        let source_id = scope
            .guard(PipelineStage::CreateSource, "registry.create_source", async {
                self.registry
                    .create_source(&source_request)
                    .await
                    .map_err(IngestError::from)
            })
            .await?;
        self.persist_external_ids(asset_id, &source_id, None, scope)
            .await?;

        let flow_request = FlowRequest {
            source_id: source_id.clone(),
            label: asset.title.clone(),
            format,
            description: asset.description.clone(),
        };
        let flow_id = scope
            .guard(PipelineStage::CreateFlow, "registry.create_flow", async {
                self.registry
                    .create_flow(&flow_request)
                    .await
                    .map_err(IngestError::from)
            })
            .await?;
        self.persist_external_ids(asset_id, &source_id, Some(&flow_id), scope)
            .await?;

        tracing::info!(
            asset.id = %asset_id,
            source.id = %source_id,
            flow.id = %flow_id,
            "Registry source and flow created"
        );

        self.transition(asset_id, current, AssetStatus::Processing, scope)
            .await?;

        let request = ProcessRequest {
            asset_id,
            source_path,
            flow_id,
        };
        let outcome = self.processing.run(&request, scope).await?;

        let key = technical_metadata_key(&asset.metadata);
        let technical = serde_json::to_value(&outcome.technical).map_err(|e| {
            StageFailure::new(
                PipelineStage::PersistMetadata,
                IngestError::Transcode(format!("unserializable technical metadata: {}", e)),
            )
        })?;
        scope
            .guard(PipelineStage::PersistMetadata, "store.merge_metadata", async {
                self.store
                    .merge_metadata(asset_id, &key, technical)
                    .await
                    .map_err(IngestError::Persistence)
            })
            .await?;
        self.invalidate(asset_id).await;

        self.transition(asset_id, current, AssetStatus::Ready, scope)
            .await
    }

    async fn persist_external_ids(
        &self,
        asset_id: Uuid,
        source_id: &str,
        flow_id: Option<&str>,
        scope: &RunScope,
    ) -> Result<(), StageFailure> {
        scope
            .guard(PipelineStage::PersistExternalIds, "store.update_external_ids", async {
                self.store
                    .update_external_ids(asset_id, source_id, flow_id)
                    .await
                    .map_err(IngestError::Persistence)
            })
            .await?;
        self.invalidate(asset_id).await;
        Ok(())
    }

    /// Persist `next`, then evict the cached read-view.
    async fn transition(
        &self,
        asset_id: Uuid,
        current: &mut AssetStatus,
        next: AssetStatus,
        scope: &RunScope,
    ) -> Result<(), StageFailure> {
        scope
            .guard(PipelineStage::PersistStatus, "store.update_status", async {
                self.store
                    .update_status(asset_id, next)
                    .await
                    .map_err(IngestError::Persistence)
            })
            .await?;

        self.observer.on_transition(asset_id, *current, next);
        *current = next;
        self.invalidate(asset_id).await;
        Ok(())
    }

    /// Best-effort cache eviction. Runs after the write it follows even if the run has
    /// been cancelled meanwhile.
    async fn invalidate(&self, asset_id: Uuid) {
        match self
            .bounded("cache.invalidate", self.cache.invalidate_asset(asset_id))
            .await
        {
            Some(Ok(())) => {}
            Some(Err(e)) => self.observer.on_cache_invalidation_failed(asset_id, &e),
            None => self.observer.on_cache_invalidation_failed(
                asset_id,
                &mam_infra::CacheError::Command("invalidation timed out".to_string()),
            ),
        }
    }

    /// Record the failure of a run whose task died without returning, e.g. on a panic.
    /// The last persisted status is read back since the dead task's view is lost.
    pub async fn recover(&self, asset_id: Uuid, stage: PipelineStage, detail: String) -> AssetStatus {
        let current = match self
            .bounded("store.get_asset", self.store.get_asset(asset_id))
            .await
        {
            Some(Ok(Some(asset))) => asset.status,
            Some(Ok(None)) => {
                tracing::error!(asset.id = %asset_id, "Asset vanished before its run was recovered");
                return AssetStatus::Failed;
            }
            // Unknown; the store still rejects an illegal transition to `failed`.
            Some(Err(_)) | None => AssetStatus::New,
        };

        let failure = StageFailure::new(stage, IngestError::Internal(detail));
        self.record_failure(asset_id, current, failure).await
    }

    /// Persist the diagnostics, then the `failed` status. Not subject to the run's
    /// cancellation: a cancelled run still has to record why it stopped.
    async fn record_failure(
        &self,
        asset_id: Uuid,
        current: AssetStatus,
        failure: StageFailure,
    ) -> AssetStatus {
        self.observer.on_failure(asset_id, &failure);

        if current.is_terminal() {
            tracing::warn!(
                asset.id = %asset_id,
                status = %current,
                error = %failure,
                "Failure after terminal status; status left unchanged"
            );
            return current;
        }

        let info = failure.to_error_info();
        match self
            .bounded("store.update_error_info", self.store.update_error_info(asset_id, &info))
            .await
        {
            Some(Ok(())) => self.invalidate(asset_id).await,
            Some(Err(e)) => tracing::error!(
                asset.id = %asset_id,
                error = %e,
                "Failed to persist failure diagnostics"
            ),
            None => tracing::error!(
                asset.id = %asset_id,
                "Timed out persisting failure diagnostics"
            ),
        }

        match self
            .bounded(
                "store.update_status",
                self.store.update_status(asset_id, AssetStatus::Failed),
            )
            .await
        {
            Some(Ok(())) => {
                self.observer
                    .on_transition(asset_id, current, AssetStatus::Failed);
                self.invalidate(asset_id).await;
            }
            Some(Err(e)) => tracing::error!(
                asset.id = %asset_id,
                error = %e,
                "Failed to persist failed status"
            ),
            None => tracing::error!(asset.id = %asset_id, "Timed out persisting failed status"),
        }

        AssetStatus::Failed
    }

    /// Bound a call by the per-call timeout only.
    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = T>) -> Option<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(
                    operation = operation,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "External call timed out"
                );
                None
            }
        }
    }
}
