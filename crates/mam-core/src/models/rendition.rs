use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One proxy rendition to produce from the source media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRendition {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate as understood by the transcoder (e.g. `2500k`)
    pub bitrate: String,
    pub codec: String,
}

impl ProxyRendition {
    /// Output file name for this rendition.
    pub fn file_name(&self) -> String {
        format!("{}.mp4", self.name)
    }

    /// Parse a comma separated list of `name:WxH:bitrate:codec` entries.
    pub fn parse_list(value: &str) -> Result<Vec<ProxyRendition>, anyhow::Error> {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ProxyRendition::from_str)
            .collect()
    }
}

impl FromStr for ProxyRendition {
    type Err = anyhow::Error;

    /// Parses `name:WxH:bitrate:codec`, e.g. `proxy_720p:1280x720:2500k:libx264`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [name, size, bitrate, codec] = parts.as_slice() else {
            return Err(anyhow::anyhow!(
                "Invalid proxy rendition '{}': expected name:WxH:bitrate:codec",
                s
            ));
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(anyhow::anyhow!("Invalid proxy rendition name '{}'", name));
        }

        let (width, height) = size
            .split_once('x')
            .ok_or_else(|| anyhow::anyhow!("Invalid proxy resolution '{}'", size))?;
        let width: u32 = width
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid proxy width '{}'", width))?;
        let height: u32 = height
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid proxy height '{}'", height))?;
        if width == 0 || height == 0 {
            return Err(anyhow::anyhow!("Proxy resolution must be non-zero"));
        }

        if bitrate.is_empty() || codec.is_empty() {
            return Err(anyhow::anyhow!(
                "Proxy rendition '{}' needs a bitrate and a codec",
                name
            ));
        }

        Ok(ProxyRendition {
            name: name.to_string(),
            width,
            height,
            bitrate: bitrate.to_string(),
            codec: codec.to_string(),
        })
    }
}
