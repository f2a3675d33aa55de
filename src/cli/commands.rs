//! Command implementations for the binary

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::http::HttpDataClient;
use crate::client::DataClient;
use crate::config::Config;
use crate::events::EventBus;
use crate::monitor::categorizer::Categorizer;
use crate::monitor::metrics::MetricsEngine;
use crate::monitor::scheduler::TierScheduler;
use crate::monitor::wallet::WalletRegistry;
use crate::trading::executor::{ExecutionProvider, HttpExecutor, SimulatedExecutor};
use crate::trading::orchestrator::Orchestrator;
use crate::trading::position::PositionBook;

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Run the observer until ctrl-c
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if config.watchlist.is_empty() {
        anyhow::bail!("watchlist is empty, nothing to observe");
    }
    info!(
        wallets = config.watchlist.len(),
        dry_run, "starting wallet observer"
    );

    let client: Arc<dyn DataClient> = Arc::new(HttpDataClient::new(&config.provider)?);
    let events = EventBus::default();

    let executor: Arc<dyn ExecutionProvider> = if dry_run {
        warn!("dry-run mode: trades are simulated, no funds move");
        Arc::new(SimulatedExecutor::new(Arc::clone(&client)))
    } else {
        Arc::new(HttpExecutor::new(&config.execution)?)
    };

    let registry = Arc::new(WalletRegistry::from_watchlist(
        &config.watchlist,
        chrono::Utc::now(),
    ));
    let categorizer = Categorizer::new(Arc::clone(&client), &config.lexicon);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    let metrics = Arc::new(MetricsEngine::new(
        categorizer,
        config.scoring.clone(),
        signal_tx,
        events.clone(),
    ));
    let scheduler = Arc::new(TierScheduler::new(
        Arc::clone(&client),
        registry,
        Arc::clone(&metrics),
        config.monitor.clone(),
        config.provider.tx_fetch_limit,
        events.clone(),
    ));
    let book = Arc::new(PositionBook::new(
        executor,
        config.trading.clone(),
        events.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        client,
        book,
        metrics,
        Arc::clone(&scheduler),
        config.monitor.clone(),
        config.trading.clone(),
        events.clone(),
    ));

    // Mark existing history as seen before any loop starts
    scheduler.initial_scan().await;

    let cancel = CancellationToken::new();
    let handles = orchestrator.spawn(signal_rx, cancel.clone());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("provider:");
    println!("  base_url: {}", config.provider.base_url);
    println!("  timeout_ms: {}", config.provider.timeout_ms);
    println!("  tx_fetch_limit: {}", config.provider.tx_fetch_limit);
    println!("execution:");
    println!("  base_url: {}", config.execution.base_url);
    println!("  slippage_pct: {}", config.execution.slippage_pct);
    println!("monitor:");
    println!(
        "  tier intervals (secs): very_active={} active={} watching={} asleep={}",
        config.monitor.very_active_interval_secs,
        config.monitor.active_interval_secs,
        config.monitor.watching_interval_secs,
        config.monitor.asleep_interval_secs,
    );
    println!("  batch_size: {}", config.monitor.batch_size);
    println!(
        "  min_reference_amount: {}",
        config.monitor.min_reference_amount
    );
    println!("scoring thresholds:");
    println!("  ai: {}", config.scoring.thresholds.ai);
    println!("  meme: {}", config.scoring.thresholds.meme);
    println!("  hybrid: {}", config.scoring.thresholds.hybrid);
    println!("trading:");
    println!(
        "  caps: total={} ai+hybrid={} meme={}",
        config.trading.max_positions,
        config.trading.max_ai_positions,
        config.trading.max_meme_positions,
    );
    println!(
        "  entry sizes: ai={} meme={} hybrid={}",
        config.trading.ai_entry_size,
        config.trading.meme_entry_size,
        config.trading.hybrid_entry_size,
    );
    for (i, level) in config.trading.profit_levels.iter().enumerate() {
        println!(
            "  tp[{i}]: +{:.0}% sell {:.0}%",
            level.increase * 100.0,
            level.sell_portion * 100.0
        );
    }
    println!(
        "  stop_loss: -{:.0}%",
        config.trading.stop_loss_fraction * 100.0
    );
    println!("watchlist: {} wallets", config.watchlist.len());
    Ok(())
}
