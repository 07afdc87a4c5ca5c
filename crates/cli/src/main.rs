//! relayctl - drive the conversation relay from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

/// relayctl - Replay chat webhooks through the debouncing relay
#[derive(Parser)]
#[command(name = "relayctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./relay.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded webhook payloads (JSON lines) through the relay
    Replay {
        /// File with one `{"after_ms": .., "payload": {..}}` object per line
        file: PathBuf,

        /// Wait for each message's outcome like the sync endpoint
        #[arg(long)]
        sync: bool,

        /// Override the configured debounce delay
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show the effective configuration
    Config {
        /// Print as TOML instead of the annotated listing
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Replay {
            file,
            sync,
            delay_ms,
        } => cmd::replay::run(config, &file, sync, delay_ms).await,
        Commands::Config { raw } => cmd::config::run(config, raw).await,
    }
}
