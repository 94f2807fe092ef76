//! Shared constants

/// NMOS format URN for video flows.
pub const FORMAT_URN_VIDEO: &str = "urn:x-nmos:format:video";

/// NMOS format URN for audio flows.
pub const FORMAT_URN_AUDIO: &str = "urn:x-nmos:format:audio";

/// NMOS format URN for anything that is neither video nor audio.
pub const FORMAT_URN_DATA: &str = "urn:x-nmos:format:data";

/// Prefix of the cached read-view key of an asset (`asset:{id}`).
pub const ASSET_CACHE_KEY_PREFIX: &str = "asset:";

/// Metadata key under which extracted technical metadata is stored.
pub const TECHNICAL_METADATA_KEY: &str = "technical";

/// Prepended to [`TECHNICAL_METADATA_KEY`] until the key is free of caller metadata.
pub const TECHNICAL_METADATA_COLLISION_PREFIX: char = '_';

/// Cache key for an asset's read-view.
pub fn asset_cache_key(asset_id: &uuid::Uuid) -> String {
    format!("{}{}", ASSET_CACHE_KEY_PREFIX, asset_id)
}
