use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CacheError, CacheInvalidator};

/// Invalidator used when no cache is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheInvalidator for NoopCache {
    async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache that also remembers every invalidation, in order.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    invalidations: Arc<Mutex<Vec<String>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().await.insert(key.into(), value.into());
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Keys passed to `invalidate`, oldest first.
    pub async fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().await.clone()
    }
}

#[async_trait]
impl CacheInvalidator for InMemoryCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        self.invalidations.lock().await.push(key.to_string());
        Ok(())
    }
}
