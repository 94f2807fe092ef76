//! Data models for the ingest pipeline
//!
//! Each sub-module represents one part of the domain: the catalog asset and its
//! lifecycle, the ingest/process requests, and time-indexed segments.

mod asset;
mod ingest;
mod rendition;
mod segment;

pub use asset::{technical_metadata_key, Asset, AssetStatus, AssetType, ErrorInfo, PipelineStage};
pub use ingest::{IngestRequest, ProcessRequest};
pub use rendition::ProxyRendition;
pub use segment::{Segment, TimeRange};
