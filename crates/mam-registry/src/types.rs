use mam_storage::Destination;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRequest {
    pub label: String,
    pub format: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRequest {
    pub source_id: String,
    pub label: String,
    pub format: String,
    pub description: String,
}

/// Storage allocated by the registry for exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAllocation {
    pub object_id: String,
    pub destination: Destination,
}

// Wire formats

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedSource {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FlowBody<'a> {
    pub id: &'a str,
    pub source_id: &'a str,
    pub format: &'a str,
    pub label: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StorageBody {
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageResponse {
    #[serde(default)]
    pub media_objects: Vec<MediaObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaObject {
    pub object_id: String,
    pub put_url: PutUrl,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutUrl {
    pub url: String,
    #[serde(rename = "content-type", default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SegmentBody<'a> {
    pub object_id: &'a str,
    pub timerange: String,
}
