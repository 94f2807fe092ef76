//! Configuration module
//!
//! Everything is read from environment variables (a `.env` file is honoured) with the
//! defaults below. Registry and storage credentials are opaque strings.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ProxyRendition;
use crate::retry::RetryPolicy;

const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const REGISTRY_TIMEOUT_SECS: u64 = 30;
const REGISTRY_MAX_RETRIES: u32 = 3;
const REGISTRY_RETRY_BASE_MS: u64 = 200;
const RETRY_MAX_DELAY_SECS: u64 = 10;
const STORAGE_TIMEOUT_SECS: u64 = 300;
const STORAGE_MAX_RETRIES: u32 = 2;
const SEGMENT_DURATION_SECS: u64 = 10;
const THUMBNAIL_WIDTH: u32 = 640;
const THUMBNAIL_HEIGHT: u32 = 360;
const PIPELINE_DEADLINE_SECS: u64 = 3600;
const EXTERNAL_CALL_TIMEOUT_SECS: u64 = 600;
const MAX_CONCURRENT_RUNS: usize = 2;
const DEFAULT_PROXY_RENDITIONS: &str = "proxy_720p:1280x720:2500k:libx264";

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// `None` when running against the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DB_MAX_CONNECTIONS,
            timeout: Duration::from_secs(DB_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4010".to_string(),
            api_token: None,
            timeout: Duration::from_secs(REGISTRY_TIMEOUT_SECS),
            retry: RetryPolicy {
                max_retries: REGISTRY_MAX_RETRIES,
                base_delay: Duration::from_millis(REGISTRY_RETRY_BASE_MS),
                max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub segment_duration: Duration,
    pub renditions: Vec<ProxyRendition>,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            segment_duration: Duration::from_secs(SEGMENT_DURATION_SECS),
            renditions: ProxyRendition::parse_list(DEFAULT_PROXY_RENDITIONS)
                .unwrap_or_default(),
            thumbnail_width: THUMBNAIL_WIDTH,
            thumbnail_height: THUMBNAIL_HEIGHT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Parent of the per-run working directories
    pub work_dir: PathBuf,
    /// Overall deadline for one pipeline run
    pub deadline: Duration,
    /// Sub-deadline applied to each external call inside a run
    pub external_call_timeout: Duration,
    pub max_concurrent_runs: usize,
    pub storage_timeout: Duration,
    pub storage_retry: RetryPolicy,
    /// Root for `file://` upload destinations; `None` rejects them.
    pub local_storage_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("mam-work"),
            deadline: Duration::from_secs(PIPELINE_DEADLINE_SECS),
            external_call_timeout: Duration::from_secs(EXTERNAL_CALL_TIMEOUT_SECS),
            max_concurrent_runs: MAX_CONCURRENT_RUNS,
            storage_timeout: Duration::from_secs(STORAGE_TIMEOUT_SECS),
            storage_retry: RetryPolicy {
                max_retries: STORAGE_MAX_RETRIES,
                ..RetryPolicy::default()
            },
            local_storage_root: None,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database: DatabaseConfig,
    /// `None` disables cache invalidation.
    pub redis_url: Option<String>,
    pub registry: RegistryConfig,
    pub transcode: TranscodeConfig,
    pub pipeline: PipelineConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let database = DatabaseConfig {
            url: env_opt("DATABASE_URL"),
            max_connections: env_or("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
            timeout: Duration::from_secs(env_or("DB_TIMEOUT_SECS", DB_TIMEOUT_SECS)),
        };

        let registry = RegistryConfig {
            base_url: env::var("TAMS_BASE_URL")
                .unwrap_or_else(|_| RegistryConfig::default().base_url),
            api_token: env_opt("TAMS_API_TOKEN"),
            timeout: Duration::from_secs(env_or("REGISTRY_TIMEOUT_SECS", REGISTRY_TIMEOUT_SECS)),
            retry: RetryPolicy {
                max_retries: env_or("REGISTRY_MAX_RETRIES", REGISTRY_MAX_RETRIES),
                base_delay: Duration::from_millis(env_or(
                    "REGISTRY_RETRY_BASE_MS",
                    REGISTRY_RETRY_BASE_MS,
                )),
                max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
            },
        };

        let renditions = ProxyRendition::parse_list(
            &env::var("PROXY_RENDITIONS").unwrap_or_else(|_| DEFAULT_PROXY_RENDITIONS.to_string()),
        )?;

        let transcode = TranscodeConfig {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            segment_duration: Duration::from_secs(env_or(
                "SEGMENT_DURATION_SECS",
                SEGMENT_DURATION_SECS,
            )),
            renditions,
            thumbnail_width: env_or("THUMBNAIL_WIDTH", THUMBNAIL_WIDTH),
            thumbnail_height: env_or("THUMBNAIL_HEIGHT", THUMBNAIL_HEIGHT),
        };

        let pipeline = PipelineConfig {
            work_dir: env_opt("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("mam-work")),
            deadline: Duration::from_secs(env_or("PIPELINE_DEADLINE_SECS", PIPELINE_DEADLINE_SECS)),
            external_call_timeout: Duration::from_secs(env_or(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                EXTERNAL_CALL_TIMEOUT_SECS,
            )),
            max_concurrent_runs: env_or("MAX_CONCURRENT_RUNS", MAX_CONCURRENT_RUNS),
            storage_timeout: Duration::from_secs(env_or("STORAGE_TIMEOUT_SECS", STORAGE_TIMEOUT_SECS)),
            storage_retry: RetryPolicy {
                max_retries: env_or("STORAGE_MAX_RETRIES", STORAGE_MAX_RETRIES),
                ..RetryPolicy::default()
            },
            local_storage_root: env_opt("LOCAL_STORAGE_ROOT").map(PathBuf::from),
        };

        Ok(Config {
            environment,
            database,
            redis_url: env_opt("REDIS_URL"),
            registry,
            transcode,
            pipeline,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database.url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if !(self.registry.base_url.starts_with("http://")
            || self.registry.base_url.starts_with("https://"))
        {
            return Err(anyhow::anyhow!("TAMS_BASE_URL must be an http(s) URL"));
        }

        if self.is_production() && self.registry.api_token.is_none() {
            return Err(anyhow::anyhow!("TAMS_API_TOKEN must be set in production"));
        }

        if self.transcode.segment_duration.is_zero() {
            return Err(anyhow::anyhow!("SEGMENT_DURATION_SECS must be greater than 0"));
        }

        if self.transcode.thumbnail_width == 0 || self.transcode.thumbnail_height == 0 {
            return Err(anyhow::anyhow!("Thumbnail dimensions must be greater than 0"));
        }

        if self.pipeline.max_concurrent_runs == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_RUNS must be at least 1"));
        }

        if self.pipeline.external_call_timeout > self.pipeline.deadline {
            return Err(anyhow::anyhow!(
                "EXTERNAL_CALL_TIMEOUT_SECS cannot exceed PIPELINE_DEADLINE_SECS"
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig::default(),
            redis_url: None,
            registry: RegistryConfig::default(),
            transcode: TranscodeConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}
