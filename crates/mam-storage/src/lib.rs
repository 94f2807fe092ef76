//! MAM Storage Library
//!
//! Uploads local segment files to destinations handed out by the registry.
//!
//! # Destinations
//!
//! - `http://` / `https://`: a pre-signed URL accepting a single `PUT` of the bytes.
//! - `file://<key>`: a key below a configured local root. Keys must not contain `..` or
//!   a leading `/`.

pub mod factory;
#[cfg(feature = "storage-http")]
pub mod http;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_storage, StorageRouter};
#[cfg(feature = "storage-http")]
pub use http::HttpPutStorage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use traits::{Destination, ObjectStorage, StorageError, StorageResult};
