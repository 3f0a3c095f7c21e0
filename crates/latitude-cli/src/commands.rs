use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use latitude_config::{ConfigLoader, LatitudeConfig};
use latitude_core::{Result, Subject};
use latitude_engine::{ConfidenceEngine, SweepService};
use latitude_store::EngineStore;

/// Latitude: graduated autonomy trust engine for agent actions
#[derive(Parser)]
#[command(name = "latitude", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to latitude.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine (API server + scheduled sweep)
    Serve,
    /// Run one rescore + promotion sweep and exit
    Sweep,
    /// Rebuild one subject's record by replaying its signal log
    Rebuild {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        action: String,
    },
    /// Show the resolved configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = ConfigLoader::load(self.config.as_deref())?;

        let log_level = self
            .log_level
            .as_deref()
            .unwrap_or(&config.logging.level)
            .to_string();

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Serve => Self::cmd_serve(config).await,
            Commands::Sweep => Self::cmd_sweep(config).await,
            Commands::Rebuild { org, user, action } => {
                Self::cmd_rebuild(config, org, user, action).await
            }
            Commands::Config { json } => Self::cmd_config(config, json),
        }
    }

    fn open_engine(config: &LatitudeConfig) -> Result<ConfidenceEngine> {
        if let Some(parent) = config.storage.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Arc::new(EngineStore::open(&config.storage.db_path)?);
        Ok(ConfidenceEngine::new(store, config.engine.clone()))
    }

    async fn cmd_serve(config: LatitudeConfig) -> Result<()> {
        let engine = Self::open_engine(&config)?;

        let cancel = CancellationToken::new();
        let (sweep, rescore_tx) = SweepService::new(engine.clone(), &config.sweep, cancel.clone())?;
        let engine = engine.with_rescore_queue(rescore_tx);
        tokio::spawn(sweep.run());

        info!(db = %config.storage.db_path.display(), "latitude engine starting");
        let result = latitude_server::serve(config.server.clone(), engine).await;
        cancel.cancel();
        result
    }

    async fn cmd_sweep(config: LatitudeConfig) -> Result<()> {
        let engine = Self::open_engine(&config)?;
        let cancel = CancellationToken::new();
        let report = SweepService::run_once(&engine, &cancel).await;
        println!(
            "swept {} subjects: {} promoted, {} failed",
            report.subjects, report.promoted, report.failed
        );
        if report.failed > 0 {
            return Err(anyhow::anyhow!("sweep finished with {} failures", report.failed).into());
        }
        Ok(())
    }

    async fn cmd_rebuild(
        config: LatitudeConfig,
        org: String,
        user: String,
        action: String,
    ) -> Result<()> {
        let engine = Self::open_engine(&config)?;
        let subject = Subject::new(org, user, action);
        let record = engine.rebuild_record(&subject).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(())
    }

    fn cmd_config(config: LatitudeConfig, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| latitude_core::LatitudeError::Config(e.to_string()))?;
            println!("{rendered}");
        }
        Ok(())
    }
}
