use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{CacheError, CacheInvalidator};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed invalidator. One `ConnectionManager` is established on first use and
/// shared by every clone; it reconnects on its own after the server drops it.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
        }
    }

    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)
            .map_err(|e| CacheError::Connection(format!("Invalid Redis URL: {}", e)))?;
        Ok(Self::new(client))
    }

    /// Whether the shared connection has been established.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                match tokio::time::timeout(
                    CONNECT_TIMEOUT,
                    ConnectionManager::new(self.client.clone()),
                )
                .await
                {
                    Ok(Ok(manager)) => {
                        tracing::info!("Redis connection established");
                        Ok(manager)
                    }
                    Ok(Err(e)) => Err(CacheError::Connection(format!(
                        "Redis connection failed: {}",
                        e
                    ))),
                    Err(_) => Err(CacheError::Connection(format!(
                        "Redis connection timed out after {}s",
                        CONNECT_TIMEOUT.as_secs()
                    ))),
                }
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheInvalidator for RedisCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;

        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Command(format!("Failed to delete {}: {}", key, e)))?;

        tracing::debug!(key = %key, removed = removed, "Cache key invalidated");
        Ok(())
    }
}
