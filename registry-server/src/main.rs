//! Registry server binary

use anyhow::{Context, Result};
use clap::Parser;
use registry_server::{run_server, Config};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "registry_server=info,registry_store=info,tower_http=info";

#[derive(Parser)]
#[command(name = "registry-server")]
#[command(about = "npm-compatible package registry")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file (created with defaults if missing)
    #[arg(long)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::load_or_init(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    info!(
        config = %cli.config.display(),
        db_path = %config.db_path.display(),
        storage_driver = %config.storage_driver,
        "Configuration loaded"
    );

    run_server(config).await
}
