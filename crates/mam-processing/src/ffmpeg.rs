//! ffmpeg/ffprobe backed [`Transcoder`].
//!
//! Every invocation is an explicit argument list (never a shell string) with stdout
//! discarded and stderr captured for the error message. Child processes are killed when
//! the awaiting future is dropped, so a pipeline deadline or cancellation does not leave
//! an orphaned encoder behind.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mam_core::{ProxyRendition, TranscodeConfig};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::metadata::MediaTechnicalMetadata;
use crate::traits::Transcoder;

const SEGMENT_PREFIX: &str = "segment_";
const SEGMENT_EXTENSION: &str = "ts";

/// Validate path to prevent command injection
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

/// Executable paths are held to a stricter alphabet than media paths.
fn validate_executable(name: &str, path: &str) -> Result<()> {
    validate_path(path).with_context(|| format!("Invalid {}: contains dangerous characters", name))?;

    if path.is_empty()
        || !path.chars().all(|c| {
            c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
        })
    {
        return Err(anyhow!("Invalid {}: contains unsafe characters", name));
    }

    Ok(())
}

fn path_arg(path: &Path) -> Result<String> {
    let value = path
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", path.display()))?;
    validate_path(value)?;
    Ok(value.to_string())
}

/// `60s` -> `"60"`, `2.5s` -> `"2.5"`
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{}", duration.as_secs_f64())
    }
}

pub(crate) fn probe_args(source: &str) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        source.to_string(),
    ]
}

pub(crate) fn thumbnail_args(source: &str, output: &str, width: u32, height: u32) -> Vec<String> {
    vec![
        "-i".to_string(),
        source.to_string(),
        "-vf".to_string(),
        format!("thumbnail,scale={}:{}", width, height),
        "-frames:v".to_string(),
        "1".to_string(),
        "-y".to_string(),
        output.to_string(),
    ]
}

pub(crate) fn proxy_args(source: &str, output: &str, rendition: &ProxyRendition) -> Vec<String> {
    vec![
        "-i".to_string(),
        source.to_string(),
        "-c:v".to_string(),
        rendition.codec.clone(),
        "-b:v".to_string(),
        rendition.bitrate.clone(),
        "-vf".to_string(),
        format!("scale={}:{}", rendition.width, rendition.height),
        "-y".to_string(),
        output.to_string(),
    ]
}

pub(crate) fn segment_args(source: &str, output_pattern: &str, segment_duration: Duration) -> Vec<String> {
    vec![
        "-i".to_string(),
        source.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        format_seconds(segment_duration),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        output_pattern.to_string(),
    ]
}

/// Collect the segment files ffmpeg wrote into `dir`, in index order.
async fn collect_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut segments = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read segment directory {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(SEGMENT_PREFIX))
            .unwrap_or(false)
            && path.extension().and_then(|e| e.to_str()) == Some(SEGMENT_EXTENSION);
        if is_segment {
            segments.push(path);
        }
    }

    // Zero-padded indices sort lexically.
    segments.sort();
    Ok(segments)
}

#[derive(Debug, Clone)]
pub struct FFmpegService {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FFmpegService {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_executable("ffmpeg_path", &ffmpeg_path)?;
        validate_executable("ffprobe_path", &ffprobe_path)?;

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    pub fn from_config(config: &TranscodeConfig) -> Result<Self> {
        Self::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", program))
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let output = self.run(&self.ffmpeg_path, args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("FFmpeg failed: {}", stderr.trim()));
        }

        Ok(())
    }
}

#[async_trait]
impl Transcoder for FFmpegService {
    #[tracing::instrument(skip(self), fields(process.executable.name = "ffprobe", ffmpeg.operation = "probe"))]
    async fn probe(&self, source: &Path) -> Result<MediaTechnicalMetadata> {
        let start = Instant::now();
        let source = path_arg(source)?;

        let output = self.run(&self.ffprobe_path, &probe_args(&source)).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("ffprobe failed: {}", stderr.trim()));
        }

        let metadata = MediaTechnicalMetadata::from_ffprobe_json(&output.stdout)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            media_duration_secs = metadata.duration_secs,
            "Media probe completed"
        );

        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "ffmpeg", ffmpeg.operation = "thumbnail"))]
    async fn generate_thumbnail(
        &self,
        source: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let args = thumbnail_args(&path_arg(source)?, &path_arg(output)?, width, height);
        self.run_ffmpeg(&args).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(anyhow!("FFmpeg produced no thumbnail at {}", output.display()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, rendition), fields(process.executable.name = "ffmpeg", ffmpeg.operation = "proxy", rendition = %rendition.name))]
    async fn create_proxy(
        &self,
        source: &Path,
        output_dir: &Path,
        rendition: &ProxyRendition,
    ) -> Result<PathBuf> {
        let output = output_dir.join(rendition.file_name());
        let args = proxy_args(&path_arg(source)?, &path_arg(&output)?, rendition);
        self.run_ffmpeg(&args).await?;

        tracing::info!(path = %output.display(), "Proxy rendition created");
        Ok(output)
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "ffmpeg", ffmpeg.operation = "segment"))]
    async fn segment(
        &self,
        source: &Path,
        output_dir: &Path,
        segment_duration: Duration,
    ) -> Result<Vec<PathBuf>> {
        if segment_duration.is_zero() {
            return Err(anyhow!("Segment duration must be greater than zero"));
        }

        let pattern = output_dir.join(format!("{}%04d.{}", SEGMENT_PREFIX, SEGMENT_EXTENSION));
        let args = segment_args(&path_arg(source)?, &path_arg(&pattern)?, segment_duration);
        self.run_ffmpeg(&args).await?;

        let segments = collect_segments(output_dir).await?;
        if segments.is_empty() {
            return Err(anyhow!("FFmpeg produced no segments"));
        }

        tracing::info!(segment_count = segments.len(), "Segmentation completed");
        Ok(segments)
    }
}
