//! Tiered polling of watched wallets
//!
//! Each activity tier runs its own loop at its own cadence; a wallet is
//! polled by whichever tier it currently belongs to. Within a tick,
//! wallets are fetched in fixed-size concurrent batches with a pause
//! between batches to stay inside provider rate limits. A fetch failure
//! for one wallet never aborts the tick.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::DataClient;
use crate::config::MonitorConfig;
use crate::events::{Event, EventBus};
use crate::monitor::metrics::{MetricsEngine, ScoredSwap};
use crate::monitor::swap::SwapFilter;
use crate::monitor::wallet::{WalletRegistry, WalletStatus};

pub struct TierScheduler {
    client: Arc<dyn DataClient>,
    registry: Arc<WalletRegistry>,
    filter: SwapFilter,
    metrics: Arc<MetricsEngine>,
    config: MonitorConfig,
    tx_fetch_limit: usize,
    events: EventBus,
    /// Newest block time already scored per wallet; only strictly newer
    /// transactions are processed on later polls
    last_processed: DashMap<String, DateTime<Utc>>,
}

impl TierScheduler {
    pub fn new(
        client: Arc<dyn DataClient>,
        registry: Arc<WalletRegistry>,
        metrics: Arc<MetricsEngine>,
        config: MonitorConfig,
        tx_fetch_limit: usize,
        events: EventBus,
    ) -> Self {
        let filter = SwapFilter::new(&config);
        Self {
            client,
            registry,
            filter,
            metrics,
            config,
            tx_fetch_limit,
            events,
            last_processed: DashMap::new(),
        }
    }

    /// Mark each wallet's current history as seen so startup does not
    /// score or signal on stale transactions.
    pub async fn initial_scan(&self) {
        let addresses = self.registry.addresses();
        info!(wallets = addresses.len(), "running initial scan");

        for batch in addresses.chunks(self.config.batch_size) {
            join_all(batch.iter().map(|address| self.seed_wallet(address))).await;
            tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
        }
    }

    async fn seed_wallet(&self, address: &str) {
        match self.client.wallet_transactions(address, 1).await {
            Ok(transactions) => {
                if let Some(latest) = transactions.iter().map(|tx| tx.block_time).max() {
                    self.registry.record_activity(address, latest);
                    self.last_processed.insert(address.to_string(), latest);
                }
            }
            Err(e) => {
                warn!(wallet = %address, error = %e, "initial scan fetch failed");
            }
        }
    }

    /// Spawn one polling loop per tier. Loops run until the token cancels.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        WalletStatus::ALL
            .iter()
            .map(|tier| {
                let scheduler = Arc::clone(&self);
                let cancel = cancel.clone();
                let tier = *tier;
                tokio::spawn(async move {
                    scheduler.run_tier(tier, cancel).await;
                })
            })
            .collect()
    }

    async fn run_tier(&self, tier: WalletStatus, cancel: CancellationToken) {
        let period = Duration::from_secs(self.tier_interval_secs(tier));
        info!(tier = tier.as_str(), interval_secs = period.as_secs(), "tier loop started");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(tier).await,
                _ = cancel.cancelled() => {
                    info!(tier = tier.as_str(), "tier loop stopped");
                    return;
                }
            }
        }
    }

    fn tier_interval_secs(&self, tier: WalletStatus) -> u64 {
        match tier {
            WalletStatus::VeryActive => self.config.very_active_interval_secs,
            WalletStatus::Active => self.config.active_interval_secs,
            WalletStatus::Watching => self.config.watching_interval_secs,
            WalletStatus::Asleep => self.config.asleep_interval_secs,
        }
    }

    /// Poll every wallet currently in the tier
    pub async fn tick(&self, tier: WalletStatus) {
        let wallets = self.registry.members_of(tier, Utc::now());
        if wallets.is_empty() {
            return;
        }
        debug!(tier = tier.as_str(), wallets = wallets.len(), "polling tier");

        let mut batches = wallets.chunks(self.config.batch_size).peekable();
        while let Some(batch) = batches.next() {
            join_all(batch.iter().map(|address| self.process_wallet(address))).await;
            if batches.peek().is_some() {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }
        }
    }

    /// Fetch one wallet's recent transactions and score the new swaps
    pub async fn process_wallet(&self, address: &str) {
        let transactions = match self
            .client
            .wallet_transactions(address, self.tx_fetch_limit)
            .await
        {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!(wallet = %address, error = %e, "transaction fetch failed");
                return;
            }
        };

        let high_water = self
            .last_processed
            .get(address)
            .map(|e| *e.value());
        let mut newest = high_water;

        // Score strictly newer transactions in chronological order
        let mut transactions = transactions;
        transactions.sort_by_key(|tx| tx.block_time);
        for tx in &transactions {
            if high_water.is_some_and(|seen| tx.block_time <= seen) {
                continue;
            }
            newest = Some(newest.map_or(tx.block_time, |n| n.max(tx.block_time)));

            self.registry.record_activity(address, tx.block_time);
            self.events.publish(Event::TransactionObserved {
                wallet: address.to_string(),
                tx_hash: tx.tx_hash.clone(),
                block_time: tx.block_time,
            });

            if !self.filter.is_real_swap(tx) {
                continue;
            }
            if !self.filter.clears_dust_floor(tx) {
                debug!(wallet = %address, tx = %tx.tx_hash, "swap below dust floor");
                continue;
            }
            let amount = self.filter.reference_amount(tx);

            let reputation = self.registry.reputation(address);
            for flow in self.filter.token_flows(tx) {
                self.metrics
                    .on_swap(ScoredSwap {
                        wallet: address.to_string(),
                        wallet_reputation: reputation,
                        token_address: flow.token_address,
                        symbol: flow.symbol,
                        direction: flow.direction,
                        amount,
                        block_time: tx.block_time,
                    })
                    .await;
            }
        }

        if let Some(newest) = newest {
            self.last_processed.insert(address.to_string(), newest);
        }
    }

    /// Publish current tier membership counts
    pub fn publish_status_counts(&self) {
        let counts = self.registry.status_counts(Utc::now());
        let get = |s: WalletStatus| counts.get(&s).copied().unwrap_or(0);
        self.events.publish(Event::WalletStatusCounts {
            very_active: get(WalletStatus::VeryActive),
            active: get(WalletStatus::Active),
            watching: get(WalletStatus::Watching),
            asleep: get(WalletStatus::Asleep),
            transactions_processed: self.registry.total_transactions(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BalanceChange, TokenMetadata, WalletTransaction};
    use crate::config::{LexiconConfig, ScoringConfig, WatchedWallet};
    use crate::error::{Error, Result};
    use crate::monitor::categorizer::Categorizer;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct FakeClient {
        transactions: Mutex<HashMap<String, Vec<WalletTransaction>>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl DataClient for FakeClient {
        async fn wallet_transactions(
            &self,
            wallet: &str,
            _limit: usize,
        ) -> Result<Vec<WalletTransaction>> {
            if self.fail_for.as_deref() == Some(wallet) {
                return Err(Error::Connection("refused".into()));
            }
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .get(wallet)
                .cloned()
                .unwrap_or_default())
        }

        async fn token_metadata(&self, token: &str) -> Result<TokenMetadata> {
            Ok(TokenMetadata {
                address: token.to_string(),
                name: "Test".into(),
                symbol: "TST".into(),
                description: "plain token".into(),
            })
        }

        async fn token_price(&self, _token: &str) -> Result<f64> {
            Ok(1.0)
        }
    }

    fn swap_tx(hash: &str, at: DateTime<Utc>, sol_delta: i64, token_delta: i64) -> WalletTransaction {
        WalletTransaction {
            tx_hash: hash.to_string(),
            block_time: at,
            balance_changes: vec![
                BalanceChange {
                    address: "So11111111111111111111111111111111111111112".into(),
                    symbol: Some("SOL".into()),
                    amount: sol_delta,
                    decimals: 9,
                },
                BalanceChange {
                    address: "TokMint".into(),
                    symbol: Some("TOK".into()),
                    amount: token_delta,
                    decimals: 6,
                },
            ],
        }
    }

    fn scheduler(
        client: Arc<FakeClient>,
        wallets: &[&str],
    ) -> (Arc<TierScheduler>, mpsc::Receiver<crate::monitor::metrics::TradeSignal>) {
        let watchlist: Vec<WatchedWallet> = wallets
            .iter()
            .map(|w| WatchedWallet {
                address: w.to_string(),
                reputation: 50.0,
            })
            .collect();
        let registry = Arc::new(WalletRegistry::from_watchlist(&watchlist, Utc::now()));

        let scoring: ScoringConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        let categorizer = Categorizer::new(client.clone(), &LexiconConfig::default());
        let (tx, rx) = mpsc::channel(16);
        let metrics = Arc::new(MetricsEngine::new(
            categorizer,
            scoring,
            tx,
            EventBus::default(),
        ));

        let config: MonitorConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        (
            Arc::new(TierScheduler::new(
                client,
                registry,
                metrics,
                config,
                100,
                EventBus::default(),
            )),
            rx,
        )
    }

    #[tokio::test]
    async fn test_new_transactions_are_scored_once() {
        let now = Utc::now();
        let client = Arc::new(FakeClient {
            transactions: Mutex::new(HashMap::from([(
                "w1".to_string(),
                vec![swap_tx("t1", now, -2_000_000_000, 5_000_000)],
            )])),
            fail_for: None,
        });
        let (scheduler, _rx) = scheduler(client, &["w1"]);

        scheduler.process_wallet("w1").await;
        assert_eq!(scheduler.metrics.tracked_tokens(), 1);
        let first = scheduler.metrics.snapshot()[0].1.buy_count;
        assert_eq!(first, 1);

        // Same history again: high-water mark suppresses rescoring
        scheduler.process_wallet("w1").await;
        assert_eq!(scheduler.metrics.snapshot()[0].1.buy_count, 1);
    }

    #[tokio::test]
    async fn test_activity_promotes_wallet_tier() {
        let now = Utc::now();
        let client = Arc::new(FakeClient {
            transactions: Mutex::new(HashMap::from([(
                "w1".to_string(),
                vec![swap_tx("t1", now, -2_000_000_000, 5_000_000)],
            )])),
            fail_for: None,
        });
        let (scheduler, _rx) = scheduler(client, &["w1"]);

        // Watchlist wallets start asleep
        assert!(scheduler
            .registry
            .members_of(WalletStatus::Asleep, Utc::now())
            .contains(&"w1".to_string()));

        scheduler.tick(WalletStatus::Asleep).await;
        assert!(scheduler
            .registry
            .members_of(WalletStatus::VeryActive, Utc::now())
            .contains(&"w1".to_string()));
    }

    #[tokio::test]
    async fn test_one_failing_wallet_does_not_block_others() {
        let now = Utc::now();
        let client = Arc::new(FakeClient {
            transactions: Mutex::new(HashMap::from([(
                "w2".to_string(),
                vec![swap_tx("t1", now, -2_000_000_000, 5_000_000)],
            )])),
            fail_for: Some("w1".to_string()),
        });
        let (scheduler, _rx) = scheduler(client, &["w1", "w2"]);

        scheduler.tick(WalletStatus::Asleep).await;
        assert_eq!(scheduler.metrics.tracked_tokens(), 1);
    }

    #[tokio::test]
    async fn test_initial_scan_suppresses_stale_history() {
        let now = Utc::now();
        let client = Arc::new(FakeClient {
            transactions: Mutex::new(HashMap::from([(
                "w1".to_string(),
                vec![swap_tx("t1", now, -2_000_000_000, 5_000_000)],
            )])),
            fail_for: None,
        });
        let (scheduler, _rx) = scheduler(client.clone(), &["w1"]);

        scheduler.initial_scan().await;
        scheduler.process_wallet("w1").await;
        assert_eq!(scheduler.metrics.tracked_tokens(), 0);

        // A genuinely new transaction after startup is scored
        client.transactions.lock().unwrap().insert(
            "w1".to_string(),
            vec![
                swap_tx("t2", now + chrono::Duration::seconds(30), -3_000_000_000, 7_000_000),
                swap_tx("t1", now, -2_000_000_000, 5_000_000),
            ],
        );
        scheduler.process_wallet("w1").await;
        assert_eq!(scheduler.metrics.tracked_tokens(), 1);
        assert_eq!(scheduler.metrics.snapshot()[0].1.buy_count, 1);
    }
}
