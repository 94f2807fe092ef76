//! Registry client for time-addressable media.
//!
//! The registry owns sources, flows and segments. This crate only creates them and
//! keeps their identifiers; it never mirrors registry-side state.

pub mod client;
pub mod error;
pub mod tams;
pub mod types;

pub use client::Registry;
pub use error::RegistryError;
pub use tams::TamsClient;
pub use types::{FlowRequest, SourceRequest, StorageAllocation};
