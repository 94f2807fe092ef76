use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::AppError;

use super::asset::AssetType;

/// Caller-supplied parameters for ingesting one media file.
///
/// Consumed once to produce an [`Asset`](super::Asset) and drive its pipeline run;
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub asset_type: AssetType,
    pub user_id: String,
    #[serde(default)]
    pub metadata: JsonValue,
    pub source_path: PathBuf,
}

impl IngestRequest {
    /// Reject requests with a blank title, a non-object metadata document or a source
    /// handle that does not resolve to a readable file. The source is looked up without
    /// blocking the calling task.
    pub async fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }

        if !(self.metadata.is_object() || self.metadata.is_null()) {
            return Err(AppError::InvalidInput(
                "metadata must be a JSON object".to_string(),
            ));
        }

        if self.source_path.as_os_str().is_empty() {
            return Err(AppError::InvalidInput(
                "source media path must not be empty".to_string(),
            ));
        }

        match tokio::fs::metadata(&self.source_path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(AppError::InvalidInput(format!(
                "source media is not a regular file: {}",
                self.source_path.display()
            ))),
            Err(e) => Err(AppError::InvalidInput(format!(
                "source media cannot be resolved: {}: {}",
                self.source_path.display(),
                e
            ))),
        }
    }

    /// Caller metadata as a JSON object; `null` becomes `{}`.
    pub fn normalized_metadata(&self) -> JsonValue {
        match &self.metadata {
            JsonValue::Null => JsonValue::Object(Default::default()),
            other => other.clone(),
        }
    }
}

/// Handoff from the orchestrator to the processing stage, produced once the flow exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub asset_id: Uuid,
    pub source_path: PathBuf,
    pub flow_id: String,
}
