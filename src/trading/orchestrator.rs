//! Wires the observation pipeline to the position book
//!
//! Three loops run until shutdown: the signal consumer (single consumer,
//! so position admission is serialized), the price-refresh loop that
//! re-evaluates every open position, and the maintenance loop that prunes
//! stale token metrics and logs a book summary.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::DataClient;
use crate::config::{MonitorConfig, TradingConfig};
use crate::error::Error;
use crate::events::{Event, EventBus};
use crate::monitor::metrics::{MetricsEngine, TradeSignal};
use crate::monitor::scheduler::TierScheduler;
use crate::trading::position::PositionBook;

pub struct Orchestrator {
    client: Arc<dyn DataClient>,
    book: Arc<PositionBook>,
    metrics: Arc<MetricsEngine>,
    scheduler: Arc<TierScheduler>,
    monitor_config: MonitorConfig,
    trading_config: TradingConfig,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn DataClient>,
        book: Arc<PositionBook>,
        metrics: Arc<MetricsEngine>,
        scheduler: Arc<TierScheduler>,
        monitor_config: MonitorConfig,
        trading_config: TradingConfig,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            book,
            metrics,
            scheduler,
            monitor_config,
            trading_config,
            events,
        }
    }

    /// Spawn all long-running loops. Returned handles complete after the
    /// token cancels.
    pub fn spawn(
        self: Arc<Self>,
        signal_rx: mpsc::Receiver<TradeSignal>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Arc::clone(&self.scheduler).spawn(cancel.clone());

        let orchestrator = Arc::clone(&self);
        let signal_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.consume_signals(signal_rx, signal_cancel).await;
        }));

        let orchestrator = Arc::clone(&self);
        let refresh_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.refresh_loop(refresh_cancel).await;
        }));

        let orchestrator = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            orchestrator.maintenance_loop(cancel).await;
        }));

        handles
    }

    async fn consume_signals(
        &self,
        mut signal_rx: mpsc::Receiver<TradeSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            let signal = tokio::select! {
                s = signal_rx.recv() => match s {
                    Some(s) => s,
                    None => return,
                },
                _ = cancel.cancelled() => return,
            };
            self.handle_signal(signal).await;
        }
    }

    async fn handle_signal(&self, signal: TradeSignal) {
        info!(
            token = %signal.token_address,
            symbol = %signal.symbol,
            category = %signal.category,
            score = signal.score,
            "trade signal received"
        );
        match self.book.handle_signal(&signal).await {
            Ok(()) => {}
            // Caps and duplicates are routine, not failures
            Err(
                e @ (Error::PositionAlreadyOpen(_)
                | Error::PositionLimitReached { .. }
                | Error::CategoryLimitReached { .. }),
            ) => {
                debug!(token = %signal.token_address, reason = %e, "signal not actionable");
            }
            Err(e) => {
                warn!(token = %signal.token_address, error = %e, "failed to open position");
            }
        }
    }

    /// Re-price every open position each cycle. One token's failure never
    /// stalls the rest.
    async fn refresh_loop(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.trading_config.position_refresh_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => self.refresh_positions().await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn refresh_positions(&self) {
        for token in self.book.open_tokens() {
            let price = match self.client.token_price(&token).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(token = %token, error = %e, "price refresh failed");
                    continue;
                }
            };
            match self.book.update_position(&token, price).await {
                // Raced with a close between listing and update
                Ok(()) | Err(Error::PositionNotFound(_)) => {}
                Err(e) => {
                    warn!(token = %token, error = %e, "position update failed");
                }
            }
        }
    }

    async fn maintenance_loop(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.monitor_config.maintenance_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => self.run_maintenance().await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn run_maintenance(&self) {
        self.metrics
            .cleanup(self.monitor_config.cleanup_max_age_hours as i64);
        self.scheduler.publish_status_counts();

        let summary = self.book.summary().await;
        self.events.publish(Event::MetricsSnapshot {
            tokens: self.metrics.snapshot(),
            open_positions: summary.open_tokens.clone(),
        });
        info!(
            open = summary.open,
            closed = summary.closed,
            realized_pnl = summary.realized_pnl,
            unrealized_pnl = summary.unrealized_pnl,
            tracked_tokens = self.metrics.tracked_tokens(),
            "book summary"
        );
    }
}
