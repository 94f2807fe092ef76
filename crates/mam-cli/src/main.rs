//! mam-ingest: submit a media file to the ingest pipeline and wait for the result.
//!
//! Configuration comes from the environment (and `.env`); see `mam_core::Config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use mam_cli::{build_request, build_service};
use mam_core::{AssetStatus, Config};
use mam_processing::{FFmpegService, Transcoder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mam-ingest", about = "Ingest media into the asset catalog")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an asset and run it through the pipeline
    Ingest {
        #[arg(long)]
        title: String,
        /// video, audio or anything else (treated as data)
        #[arg(long = "type", default_value = "video")]
        asset_type: String,
        /// Path to the source media file
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// Caller metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Keep assets in memory even if DATABASE_URL is set
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the technical metadata ffprobe reports for a file
    Probe {
        source: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let json_logs = cli.json_logs
        || std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
    mam_infra::init_telemetry(json_logs)?;

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Ingest {
            title,
            asset_type,
            source,
            description,
            metadata,
            user,
            in_memory,
        } => {
            let request = build_request(
                &title,
                &asset_type,
                &source,
                description.as_deref(),
                metadata.as_deref(),
                &user,
            )?;
            let service = build_service(&config, in_memory).await?;

            let created = service.ingest_asset(request).await?;
            tracing::info!(asset.id = %created.id, "Waiting for pipeline run");

            let asset = tokio::select! {
                asset = service.wait_for(created.id) => asset?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("Interrupted; cancelling pipeline run");
                    service.shutdown().await;
                    service.get_asset(created.id).await?
                }
            }
            .context("Asset disappeared from the store")?;

            println!("{}", serde_json::to_string_pretty(&asset)?);
            if asset.status != AssetStatus::Ready {
                std::process::exit(1);
            }
        }
        Commands::Probe { source } => {
            let ffmpeg = FFmpegService::from_config(&config.transcode)?;
            let source = source
                .canonicalize()
                .with_context(|| format!("Cannot resolve {}", source.display()))?;
            let metadata = ffmpeg.probe(&source).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}
