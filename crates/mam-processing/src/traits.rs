use anyhow::Result;
use async_trait::async_trait;
use mam_core::ProxyRendition;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::metadata::MediaTechnicalMetadata;

/// Media operations the pipeline needs from a transcoding engine.
///
/// Implementations write only to the paths they are handed; the caller owns the
/// working directory and its cleanup.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<MediaTechnicalMetadata>;

    async fn generate_thumbnail(
        &self,
        source: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Encode one proxy rendition into `output_dir`; returns the written file.
    async fn create_proxy(
        &self,
        source: &Path,
        output_dir: &Path,
        rendition: &ProxyRendition,
    ) -> Result<PathBuf>;

    /// Split `source` into contiguous segments of `segment_duration` (the last may be
    /// shorter). Returns the segment files in playback order.
    async fn segment(
        &self,
        source: &Path,
        output_dir: &Path,
        segment_duration: Duration,
    ) -> Result<Vec<PathBuf>>;
}
