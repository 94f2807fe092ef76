//! Wiring for the `mam-ingest` binary: turns configuration into collaborators and
//! command-line arguments into ingest requests.

use anyhow::{anyhow, Context};
use mam_core::{AssetType, Config, IngestRequest};
use mam_db::{AssetRepository, AssetStore, InMemoryAssetStore};
use mam_infra::{CacheInvalidator, NoopCache, RedisCache};
use mam_ingest::{Collaborators, IngestService};
use mam_processing::FFmpegService;
use mam_registry::TamsClient;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

/// Parse the `--metadata` argument. Absent means an empty document.
pub fn parse_metadata(raw: Option<&str>) -> anyhow::Result<JsonValue> {
    match raw {
        None => Ok(JsonValue::Object(Default::default())),
        Some(raw) => {
            let value: JsonValue =
                serde_json::from_str(raw).context("--metadata is not valid JSON")?;
            if !value.is_object() {
                return Err(anyhow!("--metadata must be a JSON object"));
            }
            Ok(value)
        }
    }
}

pub fn build_request(
    title: &str,
    asset_type: &str,
    source: &Path,
    description: Option<&str>,
    metadata: Option<&str>,
    user: &str,
) -> anyhow::Result<IngestRequest> {
    // Relative paths and `..` segments are resolved here; the transcoder refuses them.
    let source_path = source
        .canonicalize()
        .with_context(|| format!("Cannot resolve source media {}", source.display()))?;

    Ok(IngestRequest {
        title: title.to_string(),
        description: description.unwrap_or_default().to_string(),
        asset_type: AssetType::from_label(asset_type),
        user_id: user.to_string(),
        metadata: parse_metadata(metadata)?,
        source_path,
    })
}

async fn asset_store(config: &Config, in_memory: bool) -> anyhow::Result<Arc<dyn AssetStore>> {
    match (&config.database.url, in_memory) {
        (Some(_), false) => {
            let pool = mam_db::connect(&config.database).await?;
            Ok(Arc::new(AssetRepository::new(pool)))
        }
        (None, false) => {
            tracing::warn!("DATABASE_URL not set; assets are kept in memory");
            Ok(Arc::new(InMemoryAssetStore::new()))
        }
        (_, true) => Ok(Arc::new(InMemoryAssetStore::new())),
    }
}

fn cache(config: &Config) -> anyhow::Result<Arc<dyn CacheInvalidator>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(
            RedisCache::open(url).context("Failed to create Redis client")?,
        )),
        None => Ok(Arc::new(NoopCache)),
    }
}

/// Build the ingest service from configuration. Must be called within a Tokio runtime.
pub async fn build_service(config: &Config, in_memory: bool) -> anyhow::Result<IngestService> {
    config.validate()?;

    let store = asset_store(config, in_memory).await?;
    let registry = TamsClient::new(&config.registry)?;
    let transcoder = FFmpegService::from_config(&config.transcode)
        .context("Failed to initialize FFmpeg service")?;
    let storage = mam_storage::create_storage(&config.pipeline)
        .await
        .context("Failed to initialize object storage")?;

    let collaborators = Collaborators::new(
        store,
        cache(config)?,
        Arc::new(registry),
        Arc::new(transcoder),
        storage,
    );

    Ok(IngestService::new(
        collaborators,
        &config.transcode,
        &config.pipeline,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_metadata() {
        assert_eq!(parse_metadata(None).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_metadata(Some(r#"{"show":"news"}"#)).unwrap()["show"],
            "news"
        );
        assert!(parse_metadata(Some("[1,2]")).is_err());
        assert!(parse_metadata(Some("{oops")).is_err());
    }

    #[tokio::test]
    async fn test_build_request_resolves_source() {
        let file = NamedTempFile::new().unwrap();
        let request = build_request(
            "Demo",
            "Video",
            file.path(),
            None,
            Some(r#"{"show":"news"}"#),
            "cli",
        )
        .unwrap();

        assert_eq!(request.asset_type, AssetType::Video);
        assert!(request.source_path.is_absolute());
        assert!(request.validate().await.is_ok());

        let unknown = build_request("Demo", "subtitle", file.path(), None, None, "cli").unwrap();
        assert_eq!(unknown.asset_type, AssetType::Data);
    }

    #[test]
    fn test_build_request_rejects_missing_source() {
        assert!(build_request(
            "Demo",
            "video",
            Path::new("/definitely/not/here.mov"),
            None,
            None,
            "cli"
        )
        .is_err());
    }
}
