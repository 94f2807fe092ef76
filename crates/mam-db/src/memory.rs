//! Process-local asset store
//!
//! Used for tests and for running the pipeline without a database. Enforces the same
//! transition and set-once rules as the PostgreSQL repository.

use async_trait::async_trait;
use chrono::Utc;
use mam_core::error::AppError;
use mam_core::models::{Asset, AssetStatus, ErrorInfo};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::AssetStore;

#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    assets: Arc<RwLock<HashMap<Uuid, Asset>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Asset {} not found", id))
}

fn set_once(slot: &mut Option<String>, value: &str, id: Uuid) -> Result<(), AppError> {
    match slot {
        Some(existing) if existing != value => Err(AppError::ExternalIdsAlreadySet(id)),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value.to_string());
            Ok(())
        }
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn create_asset(&self, asset: &Asset) -> Result<Uuid, AppError> {
        let mut assets = self.assets.write().await;
        if assets.contains_key(&asset.id) {
            return Err(AppError::InvalidInput(format!(
                "Asset {} already exists",
                asset.id
            )));
        }
        assets.insert(asset.id, asset.clone());
        Ok(asset.id)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        Ok(self.assets.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: AssetStatus) -> Result<(), AppError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id).ok_or_else(|| not_found(id))?;
        if !asset.status.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                asset_id: id,
                from: asset.status.to_string(),
                to: status.to_string(),
            });
        }
        asset.status = status;
        if status == AssetStatus::Ready {
            asset.error_info = None;
        }
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn update_external_ids(
        &self,
        id: Uuid,
        source_id: &str,
        flow_id: Option<&str>,
    ) -> Result<(), AppError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id).ok_or_else(|| not_found(id))?;

        // Validate both before writing either.
        let mut source_slot = asset.source_id.clone();
        let mut flow_slot = asset.flow_id.clone();
        set_once(&mut source_slot, source_id, id)?;
        if let Some(flow_id) = flow_id {
            set_once(&mut flow_slot, flow_id, id)?;
        }

        asset.source_id = source_slot;
        asset.flow_id = flow_slot;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn update_error_info(&self, id: Uuid, error_info: &ErrorInfo) -> Result<(), AppError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id).ok_or_else(|| not_found(id))?;
        asset.error_info = Some(error_info.clone());
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn merge_metadata(
        &self,
        id: Uuid,
        key: &str,
        value: JsonValue,
    ) -> Result<JsonValue, AppError> {
        let mut assets = self.assets.write().await;
        let asset = assets.get_mut(&id).ok_or_else(|| not_found(id))?;
        if !asset.metadata.is_object() {
            asset.metadata = JsonValue::Object(Default::default());
        }
        if let Some(object) = asset.metadata.as_object_mut() {
            object.insert(key.to_string(), value);
        }
        asset.updated_at = Utc::now();
        Ok(asset.metadata.clone())
    }
}
