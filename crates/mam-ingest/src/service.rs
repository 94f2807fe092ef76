//! Ingest entry point and the worker pool that executes pipeline runs.

use mam_core::{Asset, IngestRequest, PipelineConfig, PipelineStage, TranscodeConfig};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::IngestError;
use crate::pipeline::{Collaborators, Pipeline};
use crate::runs::{RunRegistry, RunTicket};
use crate::scope::RunScope;

/// Everything a run needs, handed over by value so the run shares nothing with the
/// request that created the asset.
#[derive(Debug)]
struct PipelineJob {
    asset: Asset,
    source_path: PathBuf,
    ticket: RunTicket,
}

#[derive(Debug, Clone, Copy)]
struct RunLimits {
    deadline: Duration,
    call_timeout: Duration,
}

pub struct IngestService {
    pipeline: Arc<Pipeline>,
    runs: RunRegistry,
    limits: RunLimits,
    tx: mpsc::UnboundedSender<PipelineJob>,
    shutdown: CancellationToken,
}

impl IngestService {
    /// Create the service and start its worker pool. Must be called from within a
    /// Tokio runtime.
    pub fn new(
        collaborators: Collaborators,
        transcode: &TranscodeConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        let runs = RunRegistry::new();
        let shutdown = CancellationToken::new();
        let pipeline_runner = Arc::new(Pipeline::new(collaborators, transcode, pipeline));
        let limits = RunLimits {
            deadline: pipeline.deadline,
            call_timeout: pipeline.external_call_timeout,
        };
        let max_concurrent = pipeline.max_concurrent_runs.max(1);

        // Unbounded: the queue only holds assets that are already persisted, and the
        // handoff must not wait on the submitter's side.
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::worker_pool(
            rx,
            pipeline_runner.clone(),
            runs.clone(),
            limits,
            max_concurrent,
            shutdown.clone(),
        ));

        tracing::info!(
            max_concurrent = max_concurrent,
            deadline_secs = limits.deadline.as_secs(),
            "Ingest service initialized"
        );

        Self {
            pipeline: pipeline_runner,
            runs,
            limits,
            tx,
            shutdown,
        }
    }

    /// Validate the request, persist a new asset and schedule its pipeline run.
    ///
    /// Returns as soon as the asset is persisted with status `new`. The run is detached:
    /// dropping the returned future after it resolves, or the caller going away, has no
    /// effect on it. Every call creates a new asset.
    #[tracing::instrument(skip_all, fields(asset.id = tracing::field::Empty, asset.type = %request.asset_type))]
    pub async fn ingest_asset(&self, request: IngestRequest) -> Result<Asset, IngestError> {
        request.validate().await.map_err(IngestError::from)?;

        if self.shutdown.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let asset = Asset::from_request(&request);
        tracing::Span::current().record("asset.id", tracing::field::display(asset.id));

        self.pipeline
            .store()
            .create_asset(&asset)
            .await
            .map_err(IngestError::Persistence)?;

        // No await from here on: once the asset exists its run is always scheduled.
        let ticket = self.runs.register(asset.id)?;
        let job = PipelineJob {
            asset: asset.clone(),
            source_path: request.source_path,
            ticket,
        };

        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            // The worker pool stopped between the shutdown check and the handoff. The
            // run is cancelled right away so the asset still reaches a terminal status.
            tracing::warn!(asset.id = %asset.id, "Worker pool stopped; cancelling pipeline run");
            job.ticket.token.cancel();
            let handle = tokio::spawn(Self::execute(
                job,
                self.pipeline.clone(),
                self.runs.clone(),
                self.limits,
                None,
            ));
            self.runs.attach(asset.id, handle);
        }

        tracing::info!(asset.id = %asset.id, title = %asset.title, "Asset created; pipeline scheduled");
        Ok(asset)
    }

    pub async fn get_asset(&self, asset_id: Uuid) -> Result<Option<Asset>, IngestError> {
        self.pipeline
            .store()
            .get_asset(asset_id)
            .await
            .map_err(IngestError::Persistence)
    }

    /// Assets whose run has not reached a terminal status yet.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.runs.active_runs()
    }

    /// Cancel a run; it ends `failed` with reason `cancelled`. Returns `false` if the
    /// asset has no active run.
    pub fn cancel(&self, asset_id: Uuid) -> bool {
        let cancelled = self.runs.cancel(asset_id);
        if cancelled {
            tracing::info!(asset.id = %asset_id, "Pipeline run cancellation requested");
        }
        cancelled
    }

    /// Wait for the asset's run (if any) to finish, then read the asset back.
    pub async fn wait_for(&self, asset_id: Uuid) -> Result<Option<Asset>, IngestError> {
        self.runs.wait_for(asset_id).await;
        self.get_asset(asset_id).await
    }

    /// Stop accepting requests, cancel every active run and wait for all of them to
    /// record their terminal status.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.runs.shutdown().await;
        tracing::info!("Ingest service stopped");
    }

    async fn worker_pool(
        mut rx: mpsc::UnboundedReceiver<PipelineJob>,
        pipeline: Arc<Pipeline>,
        runs: RunRegistry,
        limits: RunLimits,
        max_concurrent: usize,
        shutdown: CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        loop {
            let job = tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };
            Self::spawn_run(job, &pipeline, &runs, limits, &semaphore);
        }

        // Jobs already queued still need a terminal status; their runs are cancelled
        // and fail fast.
        rx.close();
        while let Some(job) = rx.recv().await {
            Self::spawn_run(job, &pipeline, &runs, limits, &semaphore);
        }
    }

    fn spawn_run(
        job: PipelineJob,
        pipeline: &Arc<Pipeline>,
        runs: &RunRegistry,
        limits: RunLimits,
        semaphore: &Arc<Semaphore>,
    ) {
        let asset_id = job.asset.id;
        let handle = tokio::spawn(Self::execute(
            job,
            pipeline.clone(),
            runs.clone(),
            limits,
            Some(semaphore.clone()),
        ));
        runs.attach(asset_id, handle);
    }

    #[tracing::instrument(skip_all, fields(asset.id = %job.asset.id, job.status = tracing::field::Empty))]
    async fn execute(
        job: PipelineJob,
        pipeline: Arc<Pipeline>,
        runs: RunRegistry,
        limits: RunLimits,
        semaphore: Option<Arc<Semaphore>>,
    ) {
        let PipelineJob {
            asset,
            source_path,
            ticket,
        } = job;
        let asset_id = asset.id;

        // Waiting for a slot is abandoned on cancellation; the run then fails fast.
        let _permit = match semaphore {
            Some(semaphore) => tokio::select! {
                biased;
                _ = ticket.token.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            },
            None => None,
        };

        let scope = RunScope::new(ticket.token.clone(), limits.deadline, limits.call_timeout);

        // The run executes in its own task so a panic cannot skip the terminal status
        // and the registry cleanup below.
        let run = tokio::spawn({
            let pipeline = pipeline.clone();
            let scope = scope.clone();
            async move { pipeline.run(asset, source_path, &scope).await }
        });
        let status = match run.await {
            Ok(status) => status,
            Err(e) => {
                let detail = if e.is_panic() {
                    format!("pipeline run panicked: {}", panic_message(e.into_panic()))
                } else {
                    "pipeline run aborted".to_string()
                };
                let stage = scope.last_stage().unwrap_or(PipelineStage::PersistStatus);
                tracing::error!(asset.id = %asset_id, stage = %stage, error = %detail, "Pipeline run died");
                pipeline.recover(asset_id, stage, detail).await
            }
        };

        tracing::Span::current().record("job.status", tracing::field::display(status));
        ticket.complete(status);
        runs.finish(asset_id);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
