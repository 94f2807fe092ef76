//! PostgreSQL asset repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mam_core::error::AppError;
use mam_core::models::{Asset, AssetStatus, AssetType, ErrorInfo};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::store::{predecessors_of, AssetStore};

const ASSET_COLUMNS: &str = "id, title, description, asset_type, status, metadata, created_by, \
     source_id, flow_id, error_info, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    title: String,
    description: String,
    asset_type: String,
    status: String,
    metadata: JsonValue,
    created_by: String,
    source_id: Option<String>,
    flow_id: Option<String>,
    error_info: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = AppError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let asset_type: AssetType = row
            .asset_type
            .parse()
            .map_err(AppError::from)?;
        let status: AssetStatus = row
            .status
            .parse()
            .map_err(AppError::from)?;
        let error_info = row
            .error_info
            .map(serde_json::from_value::<ErrorInfo>)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Corrupt error_info: {}", e)))?;

        Ok(Asset {
            id: row.id,
            title: row.title,
            description: row.description,
            asset_type,
            status,
            metadata: row.metadata,
            created_by: row.created_by,
            source_id: row.source_id,
            flow_id: row.flow_id,
            error_info,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> =
            sqlx::query_as::<Postgres, (String,)>("SELECT status FROM assets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self, asset), fields(asset.id = %asset.id))]
    async fn create_asset(&self, asset: &Asset) -> Result<Uuid, AppError> {
        let error_info = asset
            .error_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let (id,): (Uuid,) = sqlx::query_as::<Postgres, (Uuid,)>(
            r#"
            INSERT INTO assets (
                id, title, description, asset_type, status, metadata, created_by,
                source_id, flow_id, error_info, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(asset.id)
        .bind(&asset.title)
        .bind(&asset.description)
        .bind(asset.asset_type.to_string())
        .bind(asset.status.to_string())
        .bind(&asset.metadata)
        .bind(&asset.created_by)
        .bind(asset.source_id.as_deref())
        .bind(asset.flow_id.as_deref())
        .bind(error_info)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let query = format!("SELECT {} FROM assets WHERE id = $1", ASSET_COLUMNS);
        let row = sqlx::query_as::<Postgres, AssetRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Asset::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(asset.id = %id, status = %status))]
    async fn update_status(&self, id: Uuid, status: AssetStatus) -> Result<(), AppError> {
        let allowed: Vec<String> = predecessors_of(status)
            .iter()
            .map(ToString::to_string)
            .collect();

        let updated: Option<(Uuid,)> = sqlx::query_as::<Postgres, (Uuid,)>(
            r#"
            UPDATE assets
            SET status = $2,
                error_info = CASE WHEN $2 = 'ready' THEN NULL ELSE error_info END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(());
        }

        match self.current_status(id).await? {
            None => Err(AppError::NotFound(format!("Asset {} not found", id))),
            Some(from) => Err(AppError::InvalidTransition {
                asset_id: id,
                from,
                to: status.to_string(),
            }),
        }
    }

    #[tracing::instrument(skip(self), fields(asset.id = %id))]
    async fn update_external_ids(
        &self,
        id: Uuid,
        source_id: &str,
        flow_id: Option<&str>,
    ) -> Result<(), AppError> {
        let updated: Option<(Uuid,)> = sqlx::query_as::<Postgres, (Uuid,)>(
            r#"
            UPDATE assets
            SET source_id = COALESCE(source_id, $2),
                flow_id = COALESCE(flow_id, $3),
                updated_at = NOW()
            WHERE id = $1
              AND (source_id IS NULL OR source_id = $2)
              AND ($3::text IS NULL OR flow_id IS NULL OR flow_id = $3)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(source_id)
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(());
        }

        match self.current_status(id).await? {
            None => Err(AppError::NotFound(format!("Asset {} not found", id))),
            Some(_) => Err(AppError::ExternalIdsAlreadySet(id)),
        }
    }

    #[tracing::instrument(skip(self, error_info), fields(asset.id = %id))]
    async fn update_error_info(&self, id: Uuid, error_info: &ErrorInfo) -> Result<(), AppError> {
        let value = serde_json::to_value(error_info)?;
        let result = sqlx::query(
            "UPDATE assets SET error_info = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset {} not found", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, value), fields(asset.id = %id))]
    async fn merge_metadata(
        &self,
        id: Uuid,
        key: &str,
        value: JsonValue,
    ) -> Result<JsonValue, AppError> {
        let row: Option<(JsonValue,)> = sqlx::query_as::<Postgres, (JsonValue,)>(
            r#"
            UPDATE assets
            SET metadata = COALESCE(metadata, '{}'::jsonb) || jsonb_build_object($2::text, $3::jsonb),
                updated_at = NOW()
            WHERE id = $1
            RETURNING metadata
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.0)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))
    }
}
