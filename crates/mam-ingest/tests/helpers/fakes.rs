//! In-memory stand-ins for the pipeline's collaborators.
//!
//! Every fake appends what it was asked to do to a shared [`EventLog`], so tests can
//! assert on the order of operations across collaborators.

use anyhow::anyhow;
use async_trait::async_trait;
use mam_core::{
    AppError, Asset, AssetStatus, ErrorInfo, ProxyRendition, Segment, TimeRange,
};
use mam_db::{AssetStore, InMemoryAssetStore};
use mam_infra::{CacheError, CacheInvalidator};
use mam_ingest::{PipelineObserver, StageFailure};
use mam_processing::{MediaTechnicalMetadata, Transcoder, VideoStreamInfo};
use mam_registry::{FlowRequest, Registry, RegistryError, SourceRequest, StorageAllocation};
use mam_storage::{Destination, ObjectStorage, StorageError, StorageResult};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

/// A point in the pipeline where a fake can fail or hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CreateSource,
    CreateFlow,
    Probe,
    Thumbnail,
    Proxy,
    Segment,
    Allocate(usize),
    Upload(usize),
    Register(usize),
    StatusWrite(AssetStatus),
    ExternalIdsWrite,
}

#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail: Option<Fault>,
    pub hang: Option<Fault>,
    pub panic: Option<Fault>,
}

impl Faults {
    /// Panic or hang forever if `point` is the panic or hang point; `true` if it is the
    /// failure point.
    async fn hit(&self, point: Fault) -> bool {
        if self.panic == Some(point) {
            panic!("injected panic at {:?}", point);
        }
        if self.hang == Some(point) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.fail == Some(point)
    }
}

pub struct FakeRegistry {
    events: EventLog,
    faults: Faults,
    sources: AtomicUsize,
    flows: AtomicUsize,
    allocations: AtomicUsize,
    registrations: AtomicUsize,
    pub source_requests: Mutex<Vec<SourceRequest>>,
    pub flow_requests: Mutex<Vec<FlowRequest>>,
    pub registered: Mutex<Vec<(String, String, TimeRange)>>,
}

impl FakeRegistry {
    pub fn new(events: EventLog, faults: Faults) -> Self {
        Self {
            events,
            faults,
            sources: AtomicUsize::new(0),
            flows: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
            source_requests: Mutex::new(Vec::new()),
            flow_requests: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn registered_ranges(&self) -> Vec<TimeRange> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, range)| *range)
            .collect()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn create_source(&self, request: &SourceRequest) -> Result<String, RegistryError> {
        self.events.push("registry:create_source");
        if self.faults.hit(Fault::CreateSource).await {
            return Err(RegistryError::Unavailable("connection refused".to_string()));
        }
        self.source_requests.lock().unwrap().push(request.clone());
        Ok(format!("src-{}", self.sources.fetch_add(1, Ordering::SeqCst)))
    }

    async fn create_flow(&self, request: &FlowRequest) -> Result<String, RegistryError> {
        self.events.push("registry:create_flow");
        if self.faults.hit(Fault::CreateFlow).await {
            return Err(RegistryError::Rejected {
                status: 400,
                body: "bad flow".to_string(),
            });
        }
        self.flow_requests.lock().unwrap().push(request.clone());
        Ok(format!("flow-{}", self.flows.fetch_add(1, Ordering::SeqCst)))
    }

    async fn allocate_storage(&self, flow_id: &str) -> Result<StorageAllocation, RegistryError> {
        let n = self.allocations.fetch_add(1, Ordering::SeqCst);
        self.events.push(format!("registry:allocate:{}", n));
        if self.faults.hit(Fault::Allocate(n)).await {
            return Err(RegistryError::Unavailable("storage backend offline".to_string()));
        }
        let object_id = format!("obj-{}", n);
        Ok(StorageAllocation {
            destination: Destination::new(format!(
                "https://bucket.example/{}/{}?sig=x",
                flow_id, object_id
            ))
            .with_content_type("video/mp2t"),
            object_id,
        })
    }

    async fn register_segment(
        &self,
        flow_id: &str,
        object_id: &str,
        range: TimeRange,
    ) -> Result<(), RegistryError> {
        let n = self.registrations.fetch_add(1, Ordering::SeqCst);
        self.events.push(format!("registry:register:{}", n));
        if self.faults.hit(Fault::Register(n)).await {
            return Err(RegistryError::Rejected {
                status: 422,
                body: "timerange overlaps".to_string(),
            });
        }
        self.registered.lock().unwrap().push((
            flow_id.to_string(),
            object_id.to_string(),
            range,
        ));
        Ok(())
    }
}

pub struct FakeTranscoder {
    events: EventLog,
    faults: Faults,
    duration: Duration,
    segment_override: Option<usize>,
    probe_delay: Duration,
    /// Reported instead of `duration` when set, whatever it is.
    pub reported_duration_secs: Mutex<Option<f64>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Directories the transcoder was asked to write into.
    pub output_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeTranscoder {
    pub fn new(
        events: EventLog,
        faults: Faults,
        duration: Duration,
        segment_override: Option<usize>,
        probe_delay: Duration,
    ) -> Self {
        Self {
            events,
            faults,
            duration,
            segment_override,
            probe_delay,
            reported_duration_secs: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            output_dirs: Mutex::new(Vec::new()),
        }
    }

    fn remember(&self, dir: &Path) {
        self.output_dirs.lock().unwrap().push(dir.to_path_buf());
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe(&self, _source: &Path) -> anyhow::Result<MediaTechnicalMetadata> {
        self.events.push("transcoder:probe");
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.probe_delay).await;
        let fail = self.faults.hit(Fault::Probe).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fail {
            return Err(anyhow!("ffprobe failed: moov atom not found"));
        }
        Ok(MediaTechnicalMetadata {
            duration_secs: self
                .reported_duration_secs
                .lock()
                .unwrap()
                .unwrap_or_else(|| self.duration.as_secs_f64()),
            container_format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            bitrate: Some(8_000_000),
            video: Some(VideoStreamInfo {
                codec: "h264".to_string(),
                width: 1920,
                height: 1080,
                frame_rate: Some(25.0),
            }),
            audio: None,
        })
    }

    async fn generate_thumbnail(
        &self,
        _source: &Path,
        output: &Path,
        _width: u32,
        _height: u32,
    ) -> anyhow::Result<()> {
        self.events.push("transcoder:thumbnail");
        if let Some(dir) = output.parent() {
            self.remember(dir);
        }
        if self.faults.hit(Fault::Thumbnail).await {
            return Err(anyhow!("FFmpeg failed: thumbnail filter error"));
        }
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }

    async fn create_proxy(
        &self,
        _source: &Path,
        output_dir: &Path,
        rendition: &ProxyRendition,
    ) -> anyhow::Result<PathBuf> {
        self.events.push(format!("transcoder:proxy:{}", rendition.name));
        self.remember(output_dir);
        if self.faults.hit(Fault::Proxy).await {
            return Err(anyhow!("FFmpeg failed: unknown encoder"));
        }
        let output = output_dir.join(rendition.file_name());
        tokio::fs::write(&output, b"mp4").await?;
        Ok(output)
    }

    async fn segment(
        &self,
        _source: &Path,
        output_dir: &Path,
        segment_duration: Duration,
    ) -> anyhow::Result<Vec<PathBuf>> {
        self.events.push("transcoder:segment");
        self.remember(output_dir);
        if self.faults.hit(Fault::Segment).await {
            return Err(anyhow!("FFmpeg failed: Invalid data found when processing input"));
        }

        let count = self.segment_override.unwrap_or_else(|| {
            let total = self.duration.as_nanos();
            let step = segment_duration.as_nanos();
            total.div_ceil(step) as usize
        });

        let mut files = Vec::with_capacity(count);
        for i in 0..count {
            let path = output_dir.join(format!("segment_{:04}.ts", i));
            tokio::fs::write(&path, vec![0u8; 188 * (i + 1)]).await?;
            files.push(path);
        }
        Ok(files)
    }
}

pub struct FakeStorage {
    events: EventLog,
    faults: Faults,
    uploads: AtomicUsize,
    /// (segment file name, destination url, bytes)
    pub uploaded: Mutex<Vec<(String, String, u64)>>,
}

impl FakeStorage {
    pub fn new(events: EventLog, faults: Faults) -> Self {
        Self {
            events,
            faults,
            uploads: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, local_path: &Path, destination: &Destination) -> StorageResult<u64> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        self.events.push(format!("storage:upload:{}", n));
        if self.faults.hit(Fault::Upload(n)).await {
            return Err(StorageError::UploadFailed("403 Forbidden".to_string()));
        }
        let size = tokio::fs::metadata(local_path).await?.len();
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.uploaded
            .lock()
            .unwrap()
            .push((name, destination.url.clone(), size));
        Ok(size)
    }
}

/// Asset store that logs each write and can be told to fail one of them.
pub struct RecordingStore {
    inner: InMemoryAssetStore,
    events: EventLog,
    faults: Faults,
}

impl RecordingStore {
    pub fn new(inner: InMemoryAssetStore, events: EventLog, faults: Faults) -> Self {
        Self {
            inner,
            events,
            faults,
        }
    }
}

#[async_trait]
impl AssetStore for RecordingStore {
    async fn create_asset(&self, asset: &Asset) -> Result<Uuid, AppError> {
        self.events.push("store:create");
        self.inner.create_asset(asset).await
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        self.inner.get_asset(id).await
    }

    async fn update_status(&self, id: Uuid, status: AssetStatus) -> Result<(), AppError> {
        if self.faults.hit(Fault::StatusWrite(status)).await {
            return Err(AppError::Internal("connection reset by peer".to_string()));
        }
        self.inner.update_status(id, status).await?;
        self.events.push(format!("store:status:{}", status));
        Ok(())
    }

    async fn update_external_ids(
        &self,
        id: Uuid,
        source_id: &str,
        flow_id: Option<&str>,
    ) -> Result<(), AppError> {
        if self.faults.hit(Fault::ExternalIdsWrite).await {
            return Err(AppError::Internal("connection reset by peer".to_string()));
        }
        self.inner.update_external_ids(id, source_id, flow_id).await?;
        self.events.push("store:external_ids");
        Ok(())
    }

    async fn update_error_info(&self, id: Uuid, error_info: &ErrorInfo) -> Result<(), AppError> {
        self.inner.update_error_info(id, error_info).await?;
        self.events.push("store:error_info");
        Ok(())
    }

    async fn merge_metadata(
        &self,
        id: Uuid,
        key: &str,
        value: JsonValue,
    ) -> Result<JsonValue, AppError> {
        let merged = self.inner.merge_metadata(id, key, value).await?;
        self.events.push(format!("store:metadata:{}", key));
        Ok(merged)
    }
}

pub struct RecordingCache {
    events: EventLog,
    failing: bool,
}

impl RecordingCache {
    pub fn new(events: EventLog, failing: bool) -> Self {
        Self { events, failing }
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.events.push(format!("cache:invalidate:{}", key));
        if self.failing {
            return Err(CacheError::Connection("redis unreachable".to_string()));
        }
        Ok(())
    }
}

pub struct RecordingObserver {
    events: EventLog,
}

impl RecordingObserver {
    pub fn new(events: EventLog) -> Self {
        Self { events }
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_transition(&self, _asset_id: Uuid, from: AssetStatus, to: AssetStatus) {
        self.events.push(format!("observer:transition:{}->{}", from, to));
    }

    fn on_failure(&self, _asset_id: Uuid, failure: &StageFailure) {
        self.events.push(format!("observer:failure:{}", failure.stage));
    }

    fn on_segment_registered(&self, _asset_id: Uuid, segment: &Segment) {
        self.events.push(format!("observer:segment:{}", segment.index));
    }

    fn on_cache_invalidation_failed(&self, _asset_id: Uuid, _error: &CacheError) {
        self.events.push("observer:cache_failed");
    }
}
