//! Hermes HL7-style message integration engine
//!
//! # Usage
//!
//! ```bash
//! # Run the engine
//! hermes
//! hermes --config hermes.toml
//!
//! # Check a configuration without starting anything
//! hermes check --config hermes.toml
//! ```

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hermes_pipeline::Engine;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogFormat};

/// Hermes - HL7-style message integration engine
#[derive(Parser, Debug)]
#[command(name = "hermes")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default)
    Serve,

    /// Load and validate the configuration, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Check) => {
            println!("configuration ok: {} channel(s)", config.channels.len());
            Ok(())
        }
        Some(Command::Serve) | None => {
            init_logging(&config, cli.log_level.as_deref())?;
            serve(config).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")
        }
        None => {
            // No config given: use hermes.toml when present, defaults otherwise.
            let default = std::path::Path::new("hermes.toml");
            if default.exists() {
                Config::from_file(default).context("failed to load configuration")
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Initialize the tracing subscriber. CLI level beats the config file.
fn init_logging(config: &Config, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or_else(|| config.log.level.as_str());
    let filter =
        EnvFilter::try_new(level).map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Console => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        channels = config.channels.len(),
        "hermes starting"
    );

    let engine = Engine::new(config.channels()).context("engine startup failed")?;
    let bound = engine.start().await.context("failed to start listeners")?;
    for (channel, addr) in &bound {
        tracing::info!(channel = %channel, address = %addr, "channel listening");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    engine.shutdown().await;
    Ok(())
}
