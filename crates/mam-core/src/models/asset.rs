use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{
    FORMAT_URN_AUDIO, FORMAT_URN_DATA, FORMAT_URN_VIDEO, TECHNICAL_METADATA_COLLISION_PREFIX,
    TECHNICAL_METADATA_KEY,
};

use super::ingest::IngestRequest;

/// Media type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Video,
    Audio,
    Data,
}

impl AssetType {
    /// Map a free-form type label to an asset type. Anything that is not
    /// `video` or `audio` is treated as generic data.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "video" => AssetType::Video,
            "audio" => AssetType::Audio,
            _ => AssetType::Data,
        }
    }

    /// Registry format URN for flows carrying this type of media.
    pub fn format_urn(&self) -> &'static str {
        match self {
            AssetType::Video => FORMAT_URN_VIDEO,
            AssetType::Audio => FORMAT_URN_AUDIO,
            AssetType::Data => FORMAT_URN_DATA,
        }
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetType::Video => write!(f, "video"),
            AssetType::Audio => write!(f, "audio"),
            AssetType::Data => write!(f, "data"),
        }
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(AssetType::Video),
            "audio" => Ok(AssetType::Audio),
            "data" => Ok(AssetType::Data),
            _ => Err(anyhow::anyhow!("Invalid asset type: {}", s)),
        }
    }
}

/// Lifecycle status of an asset.
///
/// `new -> ingesting -> processing -> ready`, with `failed` reachable from every
/// non-terminal state. `ready` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    New,
    Ingesting,
    Processing,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Ready | AssetStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        use AssetStatus::*;
        matches!(
            (self, next),
            (New, Ingesting)
                | (Ingesting, Processing)
                | (Processing, Ready)
                | (New, Failed)
                | (Ingesting, Failed)
                | (Processing, Failed)
        )
    }
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::New => write!(f, "new"),
            AssetStatus::Ingesting => write!(f, "ingesting"),
            AssetStatus::Processing => write!(f, "processing"),
            AssetStatus::Ready => write!(f, "ready"),
            AssetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AssetStatus::New),
            "ingesting" => Ok(AssetStatus::Ingesting),
            "processing" => Ok(AssetStatus::Processing),
            "ready" => Ok(AssetStatus::Ready),
            "failed" => Ok(AssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

/// Pipeline step an asset run was executing. Recorded in failure diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PersistStatus,
    CreateSource,
    CreateFlow,
    PersistExternalIds,
    PrepareWorkspace,
    ExtractMetadata,
    GenerateThumbnail,
    CreateProxies,
    Segment,
    AllocateStorage,
    UploadSegment,
    RegisterSegment,
    PersistMetadata,
}

impl PipelineStage {
    /// Human-readable failure message for this stage.
    pub fn failure_message(&self) -> &'static str {
        match self {
            PipelineStage::PersistStatus => "failed to persist asset status",
            PipelineStage::CreateSource => "failed to create TAMS source",
            PipelineStage::CreateFlow => "failed to create TAMS flow",
            PipelineStage::PersistExternalIds => "failed to update asset TAMS info",
            PipelineStage::PrepareWorkspace => "failed to prepare working directory",
            PipelineStage::ExtractMetadata => "metadata extraction failed",
            PipelineStage::GenerateThumbnail => "thumbnail generation failed",
            PipelineStage::CreateProxies => "proxy generation failed",
            PipelineStage::Segment => "segmentation failed",
            PipelineStage::AllocateStorage => "failed to allocate segment storage",
            PipelineStage::UploadSegment => "failed to upload segment",
            PipelineStage::RegisterSegment => "failed to register segment",
            PipelineStage::PersistMetadata => "failed to persist technical metadata",
        }
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            PipelineStage::PersistStatus => "persist_status",
            PipelineStage::CreateSource => "create_source",
            PipelineStage::CreateFlow => "create_flow",
            PipelineStage::PersistExternalIds => "persist_external_ids",
            PipelineStage::PrepareWorkspace => "prepare_workspace",
            PipelineStage::ExtractMetadata => "extract_metadata",
            PipelineStage::GenerateThumbnail => "generate_thumbnail",
            PipelineStage::CreateProxies => "create_proxies",
            PipelineStage::Segment => "segment",
            PipelineStage::AllocateStorage => "allocate_storage",
            PipelineStage::UploadSegment => "upload_segment",
            PipelineStage::RegisterSegment => "register_segment",
            PipelineStage::PersistMetadata => "persist_metadata",
        };
        write!(f, "{}", name)
    }
}

/// Failure diagnostics recorded on an asset whose run ended in `failed`.
///
/// Serialized with the `error_message` / `error_detail` / `error_time` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "error_message")]
    pub message: String,
    #[serde(rename = "error_detail")]
    pub detail: String,
    #[serde(rename = "error_time")]
    pub occurred_at: DateTime<Utc>,
    pub stage: PipelineStage,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
}

/// The catalog entity being ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub metadata: JsonValue,
    pub created_by: String,
    pub source_id: Option<String>,
    pub flow_id: Option<String>,
    pub error_info: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Build a fresh asset (status `new`, new identity) from an ingest request.
    pub fn from_request(request: &IngestRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            asset_type: request.asset_type,
            status: AssetStatus::New,
            metadata: request.normalized_metadata(),
            created_by: request.user_id.clone(),
            source_id: None,
            flow_id: None,
            error_info: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Key under which technical metadata is merged into `metadata`.
///
/// Caller metadata always wins: while the caller owns the candidate key, one more `_`
/// is prepended (`technical`, `_technical`, `__technical`, ...).
pub fn technical_metadata_key(metadata: &JsonValue) -> String {
    let mut key = TECHNICAL_METADATA_KEY.to_string();
    if let Some(object) = metadata.as_object() {
        while object.contains_key(&key) {
            key.insert(0, TECHNICAL_METADATA_COLLISION_PREFIX);
        }
    }
    key
}
