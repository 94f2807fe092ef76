//! MAM Database Layer
//!
//! Durable record of assets and their lifecycle. [`AssetStore`] is the contract the
//! pipeline depends on; [`AssetRepository`] implements it over PostgreSQL and
//! [`InMemoryAssetStore`] keeps everything in process.

pub mod memory;
pub mod pool;
pub mod repository;
pub mod store;

pub use memory::InMemoryAssetStore;
pub use pool::connect;
pub use repository::AssetRepository;
pub use store::AssetStore;
