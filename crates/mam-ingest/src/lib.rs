//! MAM Ingest
//!
//! Turns an ingest request into a persisted asset and drives it through
//! `new → ingesting → processing → ready` (or `failed`) on a detached run:
//!
//! 1. create a registry source and flow for the asset
//! 2. probe the media, render a thumbnail and the proxy renditions
//! 3. cut fixed-duration segments and, one by one, allocate storage, upload and
//!    register each against the flow
//!
//! Every persisted change is followed by a cache invalidation. Any failure is recorded
//! on the asset; nothing is reported back to the submitter after the asset is created.

pub mod error;
pub mod observer;
pub mod pipeline;
pub mod processing;
pub mod runs;
pub mod scope;
pub mod service;

pub use error::{IngestError, StageFailure};
pub use observer::{PipelineObserver, TracingObserver};
pub use pipeline::{Collaborators, Pipeline};
pub use processing::{ProcessingOutcome, ProcessingStage};
pub use runs::RunRegistry;
pub use scope::RunScope;
pub use service::IngestService;
