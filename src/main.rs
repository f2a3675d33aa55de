//! Whale wallet observer and signal-driven position engine
//!
//! # WARNING
//! - Live mode trades with real funds. Only use funds you can afford to lose.
//! - Observed wallets can be wrong, late, or adversarial.
//! - Dry-run success does NOT equal live success.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use whalewatch::cli::commands;
use whalewatch::config::Config;

/// Whale wallet observer and position engine
#[derive(Parser)]
#[command(name = "whalewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start observing the watchlist
    Start {
        /// Simulate trades instead of executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("whalewatch=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Config => commands::show_config(&config),
    }
}
