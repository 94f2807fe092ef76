//! Cache invalidation
//!
//! Readers cache an asset's read-view under `asset:{id}`. Writers evict that key after
//! every persisted change. Invalidation is best-effort: callers log failures and move on.

mod memory;
#[cfg(feature = "redis-cache")]
mod redis_cache;

use async_trait::async_trait;
use mam_core::constants::asset_cache_key;
use uuid::Uuid;

pub use memory::{InMemoryCache, NoopCache};
#[cfg(feature = "redis-cache")]
pub use redis_cache::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Evict a single key. Evicting a missing key succeeds.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Evict the cached read-view of an asset.
    async fn invalidate_asset(&self, asset_id: Uuid) -> Result<(), CacheError> {
        self.invalidate(&asset_cache_key(&asset_id)).await
    }
}
