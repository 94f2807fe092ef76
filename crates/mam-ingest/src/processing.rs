//! Processing stage: probe → thumbnail → proxies → segment → allocate/upload/register.

use mam_core::{
    PipelineConfig, PipelineStage, ProcessRequest, ProxyRendition, Segment, TranscodeConfig,
};
use mam_processing::{plan_segments, segment_count, MediaTechnicalMetadata, Transcoder};
use mam_registry::Registry;
use mam_storage::ObjectStorage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::error::{IngestError, StageFailure};
use crate::observer::PipelineObserver;
use crate::scope::RunScope;

const THUMBNAIL_FILE: &str = "thumbnail.jpg";
const PROXY_DIR: &str = "proxies";
const SEGMENT_DIR: &str = "segments";

/// What a successful processing stage produced. Local artifacts are gone by the time
/// this is returned; only their description survives.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub technical: MediaTechnicalMetadata,
    pub thumbnail_bytes: u64,
    pub proxies: Vec<String>,
    pub segments: Vec<Segment>,
}

pub struct ProcessingStage {
    transcoder: Arc<dyn Transcoder>,
    registry: Arc<dyn Registry>,
    storage: Arc<dyn ObjectStorage>,
    observer: Arc<dyn PipelineObserver>,
    work_dir: PathBuf,
    segment_duration: Duration,
    renditions: Vec<ProxyRendition>,
    thumbnail_size: (u32, u32),
}

impl ProcessingStage {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        registry: Arc<dyn Registry>,
        storage: Arc<dyn ObjectStorage>,
        observer: Arc<dyn PipelineObserver>,
        transcode: &TranscodeConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            transcoder,
            registry,
            storage,
            observer,
            work_dir: pipeline.work_dir.clone(),
            segment_duration: transcode.segment_duration,
            renditions: transcode.renditions.clone(),
            thumbnail_size: (transcode.thumbnail_width, transcode.thumbnail_height),
        }
    }

    /// Create the run's private working directory below the configured work dir.
    async fn prepare_workspace(&self, request: &ProcessRequest) -> Result<TempDir, StageFailure> {
        let fail = |e: std::io::Error| {
            StageFailure::new(
                PipelineStage::PrepareWorkspace,
                IngestError::Transcode(format!(
                    "cannot create working directory under {}: {}",
                    self.work_dir.display(),
                    e
                )),
            )
        };

        tokio::fs::create_dir_all(&self.work_dir).await.map_err(fail)?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("asset-{}-", request.asset_id))
            .tempdir_in(&self.work_dir)
            .map_err(fail)?;

        for dir in [PROXY_DIR, SEGMENT_DIR] {
            tokio::fs::create_dir(workspace.path().join(dir))
                .await
                .map_err(fail)?;
        }

        Ok(workspace)
    }

    /// Run the stage for one asset. The working directory is removed on every exit
    /// path, including cancellation.
    #[tracing::instrument(skip_all, fields(asset.id = %request.asset_id, flow.id = %request.flow_id))]
    pub async fn run(
        &self,
        request: &ProcessRequest,
        scope: &RunScope,
    ) -> Result<ProcessingOutcome, StageFailure> {
        let start = Instant::now();
        let workspace = self.prepare_workspace(request).await?;

        let result = self.process(request, workspace.path(), scope).await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(
                path = %workspace_path.display(),
                error = %e,
                "Failed to remove working directory"
            );
        }

        if let Ok(outcome) = &result {
            tracing::info!(
                segment_count = outcome.segments.len(),
                proxies = ?outcome.proxies,
                thumbnail_bytes = outcome.thumbnail_bytes,
                duration_ms = start.elapsed().as_millis() as u64,
                "Processing stage completed"
            );
        }

        result
    }

    async fn process(
        &self,
        request: &ProcessRequest,
        workspace: &Path,
        scope: &RunScope,
    ) -> Result<ProcessingOutcome, StageFailure> {
        let source = request.source_path.as_path();

        let technical = scope
            .guard(PipelineStage::ExtractMetadata, "transcoder.probe", async {
                self.transcoder
                    .probe(source)
                    .await
                    .map_err(IngestError::transcode)
            })
            .await?;
        let media_duration = technical.duration().map_err(|e| {
            StageFailure::new(PipelineStage::ExtractMetadata, IngestError::transcode(e))
        })?;

        tracing::info!(
            asset.id = %request.asset_id,
            media_duration_secs = technical.duration_secs,
            container = %technical.container_format,
            "Technical metadata extracted"
        );

        let thumbnail = workspace.join(THUMBNAIL_FILE);
        let (width, height) = self.thumbnail_size;
        scope
            .guard(PipelineStage::GenerateThumbnail, "transcoder.thumbnail", async {
                self.transcoder
                    .generate_thumbnail(source, &thumbnail, width, height)
                    .await
                    .map_err(IngestError::transcode)
            })
            .await?;
        let thumbnail_bytes = tokio::fs::metadata(&thumbnail)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let proxy_dir = workspace.join(PROXY_DIR);
        let mut proxies = Vec::with_capacity(self.renditions.len());
        for rendition in &self.renditions {
            scope
                .guard(PipelineStage::CreateProxies, "transcoder.proxy", async {
                    self.transcoder
                        .create_proxy(source, &proxy_dir, rendition)
                        .await
                        .map_err(|e| {
                            IngestError::transcode(
                                e.context(format!("rendition {}", rendition.name)),
                            )
                        })
                })
                .await?;
            proxies.push(rendition.name.clone());
        }

        let segment_dir = workspace.join(SEGMENT_DIR);
        let files = scope
            .guard(PipelineStage::Segment, "transcoder.segment", async {
                self.transcoder
                    .segment(source, &segment_dir, self.segment_duration)
                    .await
                    .map_err(IngestError::transcode)
            })
            .await?;

        // Checked before planning so a bogus duration never sizes an allocation.
        let expected = segment_count(media_duration, self.segment_duration);
        if files.len() as u128 != expected {
            return Err(StageFailure::new(
                PipelineStage::Segment,
                IngestError::Transcode(format!(
                    "expected {} segments for {:.3}s of media, transcoder produced {}",
                    expected,
                    technical.duration_secs,
                    files.len()
                )),
            ));
        }
        let plan = plan_segments(media_duration, self.segment_duration);

        let mut segments = Vec::with_capacity(plan.len());
        for (index, (file, range)) in files.iter().zip(plan).enumerate() {
            let segment = self
                .publish_segment(request, index, file, range, scope)
                .await
                .map_err(|failure| failure.at_segment(index))?;
            self.observer
                .on_segment_registered(request.asset_id, &segment);
            segments.push(segment);
        }

        Ok(ProcessingOutcome {
            technical,
            thumbnail_bytes,
            proxies,
            segments,
        })
    }

    /// Allocate a fresh destination, upload the file to it, then register the range.
    async fn publish_segment(
        &self,
        request: &ProcessRequest,
        index: usize,
        file: &Path,
        range: mam_core::TimeRange,
        scope: &RunScope,
    ) -> Result<Segment, StageFailure> {
        let flow_id = request.flow_id.as_str();

        let allocation = scope
            .guard(PipelineStage::AllocateStorage, "registry.allocate_storage", async {
                self.registry
                    .allocate_storage(flow_id)
                    .await
                    .map_err(IngestError::from)
            })
            .await?;

        let bytes = scope
            .guard(PipelineStage::UploadSegment, "storage.upload", async {
                self.storage
                    .upload(file, &allocation.destination)
                    .await
                    .map_err(IngestError::from)
            })
            .await?;

        scope
            .guard(PipelineStage::RegisterSegment, "registry.register_segment", async {
                self.registry
                    .register_segment(flow_id, &allocation.object_id, range)
                    .await
                    .map_err(IngestError::from)
            })
            .await?;

        tracing::debug!(
            segment.index = index,
            object.id = %allocation.object_id,
            bytes = bytes,
            "Segment published"
        );

        Ok(Segment {
            index,
            object_id: allocation.object_id,
            range,
        })
    }
}
