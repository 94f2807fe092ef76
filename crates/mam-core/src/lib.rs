//! MAM Core Library
//!
//! This crate provides the domain models, error types, configuration and retry policy
//! shared by every component of the ingest pipeline.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod retry;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, PipelineConfig, RegistryConfig, TranscodeConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    technical_metadata_key, Asset, AssetStatus, AssetType, ErrorInfo, IngestRequest,
    PipelineStage, ProcessRequest, ProxyRendition, Segment, TimeRange,
};
pub use retry::RetryPolicy;
