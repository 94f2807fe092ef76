#![allow(dead_code)]

pub mod fakes;

use mam_core::{AssetType, IngestRequest, PipelineConfig, ProxyRendition, RetryPolicy, TranscodeConfig};
use mam_db::InMemoryAssetStore;
use mam_ingest::{Collaborators, IngestService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub use fakes::{
    EventLog, Fault, Faults, FakeRegistry, FakeStorage, FakeTranscoder, RecordingCache,
    RecordingObserver, RecordingStore,
};

pub struct Harness {
    pub service: Arc<IngestService>,
    pub store: InMemoryAssetStore,
    pub registry: Arc<FakeRegistry>,
    pub transcoder: Arc<FakeTranscoder>,
    pub storage: Arc<FakeStorage>,
    pub events: EventLog,
    pub work_dir: TempDir,
    media_dir: TempDir,
}

pub struct HarnessBuilder {
    media_duration: Duration,
    segment_duration: Duration,
    segment_override: Option<usize>,
    faults: Faults,
    failing_cache: bool,
    deadline: Duration,
    call_timeout: Duration,
    max_concurrent: usize,
    probe_delay: Duration,
    renditions: Vec<ProxyRendition>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            media_duration: Duration::from_secs(125),
            segment_duration: Duration::from_secs(60),
            segment_override: None,
            faults: Faults::default(),
            failing_cache: false,
            deadline: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            max_concurrent: 2,
            probe_delay: Duration::ZERO,
            renditions: vec![
                ProxyRendition {
                    name: "proxy_720p".to_string(),
                    width: 1280,
                    height: 720,
                    bitrate: "2500k".to_string(),
                    codec: "libx264".to_string(),
                },
                ProxyRendition {
                    name: "proxy_360p".to_string(),
                    width: 640,
                    height: 360,
                    bitrate: "800k".to_string(),
                    codec: "libx264".to_string(),
                },
            ],
        }
    }
}

impl HarnessBuilder {
    pub fn media_duration(mut self, duration: Duration) -> Self {
        self.media_duration = duration;
        self
    }

    pub fn segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    /// Make the transcoder emit this many segment files whatever the duration.
    pub fn segment_count(mut self, count: usize) -> Self {
        self.segment_override = Some(count);
        self
    }

    pub fn fail_at(mut self, fault: Fault) -> Self {
        self.faults.fail = Some(fault);
        self
    }

    pub fn panic_at(mut self, fault: Fault) -> Self {
        self.faults.panic = Some(fault);
        self
    }

    pub fn hang_at(mut self, fault: Fault) -> Self {
        self.faults.hang = Some(fault);
        self
    }

    pub fn failing_cache(mut self) -> Self {
        self.failing_cache = true;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Harness {
        let events = EventLog::default();
        let work_dir = TempDir::new().unwrap();
        let media_dir = TempDir::new().unwrap();

        let store = InMemoryAssetStore::new();
        let registry = Arc::new(FakeRegistry::new(events.clone(), self.faults.clone()));
        let transcoder = Arc::new(FakeTranscoder::new(
            events.clone(),
            self.faults.clone(),
            self.media_duration,
            self.segment_override,
            self.probe_delay,
        ));
        let storage = Arc::new(FakeStorage::new(events.clone(), self.faults.clone()));

        let collaborators = Collaborators::new(
            Arc::new(RecordingStore::new(store.clone(), events.clone(), self.faults.clone())),
            Arc::new(RecordingCache::new(events.clone(), self.failing_cache)),
            registry.clone(),
            transcoder.clone(),
            storage.clone(),
        )
        .with_observer(Arc::new(RecordingObserver::new(events.clone())));

        let transcode = TranscodeConfig {
            segment_duration: self.segment_duration,
            renditions: self.renditions,
            thumbnail_width: 640,
            thumbnail_height: 360,
            ..TranscodeConfig::default()
        };
        let pipeline = PipelineConfig {
            work_dir: work_dir.path().to_path_buf(),
            deadline: self.deadline,
            external_call_timeout: self.call_timeout,
            max_concurrent_runs: self.max_concurrent,
            storage_timeout: self.call_timeout,
            storage_retry: RetryPolicy::none(),
            local_storage_root: None,
        };

        Harness {
            service: Arc::new(IngestService::new(collaborators, &transcode, &pipeline)),
            store,
            registry,
            transcoder,
            storage,
            events,
            work_dir,
            media_dir,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn source_file(&self) -> PathBuf {
        let path = self.media_dir.path().join("demo.mov");
        if !path.exists() {
            std::fs::write(&path, b"fake movie bytes").unwrap();
        }
        path
    }

    pub fn request(&self, title: &str) -> IngestRequest {
        IngestRequest {
            title: title.to_string(),
            description: "evening bulletin".to_string(),
            asset_type: AssetType::Video,
            user_id: "user-1".to_string(),
            metadata: serde_json::json!({ "show": "news" }),
            source_path: self.source_file(),
        }
    }

    /// Names of whatever is left in the work dir.
    pub fn work_dir_entries(&self) -> Vec<String> {
        std::fs::read_dir(self.work_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}
