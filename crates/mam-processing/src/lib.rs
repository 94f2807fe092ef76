//! MAM Processing Library
//!
//! Transcoding adapter for the ingest pipeline: technical metadata extraction,
//! thumbnail and proxy generation, and fixed-duration segmentation, all delegated to
//! ffprobe/ffmpeg run as external processes with explicit argument lists.

pub mod ffmpeg;
pub mod metadata;
pub mod segments;
pub mod traits;

// Re-export commonly used types
pub use ffmpeg::FFmpegService;
pub use metadata::{AudioStreamInfo, MediaTechnicalMetadata, VideoStreamInfo};
pub use segments::{plan_segments, segment_count};
pub use traits::Transcoder;
