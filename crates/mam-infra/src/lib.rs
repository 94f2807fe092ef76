//! MAM Infrastructure Library
//!
//! Shared infrastructure used by the ingest pipeline:
//! - Cache invalidation of asset read-views
//! - Telemetry initialization

pub mod cache;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheError, CacheInvalidator, InMemoryCache, NoopCache};

#[cfg(feature = "redis-cache")]
pub use cache::RedisCache;

pub use telemetry::init_telemetry;
