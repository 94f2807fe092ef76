//! Technical metadata extracted with ffprobe.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest source duration accepted from a probe (30 days). Anything beyond is a
/// bogus container header rather than real media.
pub const MAX_MEDIA_DURATION_SECS: f64 = 30.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
}

/// Attributes of the source media, stored under the asset's technical metadata key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTechnicalMetadata {
    pub duration_secs: f64,
    pub container_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoStreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioStreamInfo>,
}

impl MediaTechnicalMetadata {
    /// Source duration, provided it is positive, finite and plausible.
    pub fn duration(&self) -> Result<Duration> {
        validate_duration(self.duration_secs)?;
        Duration::try_from_secs_f64(self.duration_secs)
            .map_err(|e| anyhow!("Source duration {} out of range: {}", self.duration_secs, e))
    }

    /// Parse the JSON written by `ffprobe -print_format json -show_format -show_streams`.
    ///
    /// The first video and first audio stream are kept. A missing, non-positive,
    /// non-finite or implausibly long duration makes the output unusable.
    pub fn from_ffprobe_json(raw: &[u8]) -> Result<Self> {
        let probe: ProbeOutput =
            serde_json::from_slice(raw).context("Failed to parse ffprobe output")?;

        let duration_secs = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .or_else(|| {
                probe
                    .streams
                    .iter()
                    .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                    .reduce(f64::max)
            })
            .ok_or_else(|| anyhow!("Could not parse duration"))?;

        validate_duration(duration_secs)?;

        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .map(|s| -> Result<VideoStreamInfo> {
                Ok(VideoStreamInfo {
                    codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
                    width: s.width.ok_or_else(|| anyhow!("Could not parse width"))?,
                    height: s.height.ok_or_else(|| anyhow!("Could not parse height"))?,
                    frame_rate: s.r_frame_rate.as_deref().and_then(parse_frame_rate),
                })
            })
            .transpose()?;

        let audio = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"))
            .map(|s| AudioStreamInfo {
                codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
                sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
                channel_layout: s.channel_layout.clone(),
                channels: s.channels,
            });

        Ok(Self {
            duration_secs,
            container_format: probe
                .format
                .format_name
                .unwrap_or_else(|| "unknown".to_string()),
            bitrate: probe.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            video,
            audio,
        })
    }
}

fn validate_duration(secs: f64) -> Result<()> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(anyhow!("Source has no usable duration: {}", secs));
    }
    if secs > MAX_MEDIA_DURATION_SECS {
        return Err(anyhow!(
            "Source duration {}s exceeds the {}s limit",
            secs,
            MAX_MEDIA_DURATION_SECS
        ));
    }
    Ok(())
}

/// `"30000/1001"` -> 29.97
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channel_layout: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}
