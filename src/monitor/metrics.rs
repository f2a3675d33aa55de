//! Per-token scoring and signal emission
//!
//! Every accepted swap updates the touched token's metrics under that
//! token's map entry, so concurrent wallet ticks never interleave updates
//! to the same token. A buy contributes to the score once per wallet; a
//! sell removes that wallet's contribution. A signal fires when a token's
//! score crosses its category threshold from below.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::events::{Event, EventBus};
use crate::monitor::categorizer::{Categorizer, TokenCategory};
use crate::monitor::swap::TradeDirection;

/// A token whose score crossed its category threshold
#[derive(Debug, Clone, Serialize)]
pub struct TradeSignal {
    pub token_address: String,
    pub symbol: String,
    pub category: TokenCategory,
    pub score: f64,
    pub confidence: f64,
}

/// One score-changing event, kept for the recent-activity window
#[derive(Debug, Clone, Serialize)]
pub struct ScoreEvent {
    pub wallet: String,
    pub direction: TradeDirection,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

/// Accumulated state for one observed token
#[derive(Debug, Clone, Serialize)]
pub struct TokenMetrics {
    pub symbol: String,
    pub category: TokenCategory,
    pub confidence: f64,
    pub score: f64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub volume: f64,
    /// Score contribution per buying wallet; keys double as the buyer set
    contributions: HashMap<String, f64>,
    recent_events: VecDeque<ScoreEvent>,
    pub first_seen: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl TokenMetrics {
    fn new(symbol: String, category: TokenCategory, confidence: f64, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            category,
            confidence,
            score: 0.0,
            buy_count: 0,
            sell_count: 0,
            volume: 0.0,
            contributions: HashMap::new(),
            recent_events: VecDeque::new(),
            first_seen: now,
            last_update: now,
        }
    }

    pub fn unique_buyers(&self) -> usize {
        self.contributions.len()
    }

    pub fn recent_events(&self) -> impl Iterator<Item = &ScoreEvent> {
        self.recent_events.iter()
    }

    fn push_event(&mut self, event: ScoreEvent, cap: usize) {
        self.recent_events.push_back(event);
        while self.recent_events.len() > cap {
            self.recent_events.pop_front();
        }
    }
}

/// An observed swap ready for scoring
#[derive(Debug, Clone)]
pub struct ScoredSwap {
    pub wallet: String,
    pub wallet_reputation: f64,
    pub token_address: String,
    pub symbol: String,
    pub direction: TradeDirection,
    /// Reference-asset amount, normalized
    pub amount: f64,
    pub block_time: DateTime<Utc>,
}

pub struct MetricsEngine {
    tokens: DashMap<String, TokenMetrics>,
    categorizer: Categorizer,
    config: ScoringConfig,
    signal_tx: mpsc::Sender<TradeSignal>,
    events: EventBus,
}

impl MetricsEngine {
    pub fn new(
        categorizer: Categorizer,
        config: ScoringConfig,
        signal_tx: mpsc::Sender<TradeSignal>,
        events: EventBus,
    ) -> Self {
        Self {
            tokens: DashMap::new(),
            categorizer,
            config,
            signal_tx,
            events,
        }
    }

    /// Apply one swap to its token's metrics, emitting a signal if the
    /// score crosses the category threshold from below.
    pub async fn on_swap(&self, swap: ScoredSwap) {
        // Categorization awaits the network, so it happens before the
        // token entry lock is taken.
        let (category, confidence) = self.categorize(&swap.token_address).await;

        let now = Utc::now();
        let mut entry = self
            .tokens
            .entry(swap.token_address.clone())
            .or_insert_with(|| {
                TokenMetrics::new(swap.symbol.clone(), category, confidence, now)
            });
        let metrics = entry.value_mut();

        // A previously uncategorized token upgrades once metadata arrives.
        // Score accrued while uncategorized was never checked against this
        // category's threshold, so the upgrade resets the crossing baseline.
        let upgraded = metrics.category == TokenCategory::Uncategorized
            && category != TokenCategory::Uncategorized;
        if upgraded {
            metrics.category = category;
            metrics.confidence = confidence;
        }

        let previous = if upgraded { 0.0 } else { metrics.score };
        match swap.direction {
            TradeDirection::Buy => {
                metrics.buy_count += 1;
                metrics.volume += swap.amount;
                // One contribution per wallet however many times it buys
                metrics
                    .contributions
                    .entry(swap.wallet.clone())
                    .or_insert_with(|| {
                        self.config.reputation_weight * swap.wallet_reputation
                            + self.config.volume_weight * swap.amount
                    });
            }
            TradeDirection::Sell => {
                metrics.sell_count += 1;
                if metrics.contributions.remove(&swap.wallet).is_none() {
                    debug!(
                        token = %swap.token_address,
                        wallet = %swap.wallet,
                        "sell from wallet with no recorded buy"
                    );
                }
            }
        }
        metrics.score = metrics.contributions.values().sum::<f64>().max(0.0);
        metrics.last_update = now;
        metrics.push_event(
            ScoreEvent {
                wallet: swap.wallet.clone(),
                direction: swap.direction,
                amount: swap.amount,
                at: swap.block_time,
            },
            self.config.recent_events,
        );

        debug!(
            token = %swap.token_address,
            direction = swap.direction.as_str(),
            score = metrics.score,
            buyers = metrics.unique_buyers(),
            "scored swap"
        );

        let crossed = self
            .config
            .thresholds
            .for_category(metrics.category)
            .is_some_and(|t| previous < t && metrics.score >= t);

        if crossed {
            let signal = TradeSignal {
                token_address: swap.token_address.clone(),
                symbol: metrics.symbol.clone(),
                category: metrics.category,
                score: metrics.score,
                confidence: metrics.confidence,
            };
            drop(entry);

            info!(
                token = %signal.token_address,
                symbol = %signal.symbol,
                category = %signal.category,
                score = signal.score,
                "score crossed threshold"
            );
            self.events.publish(Event::SignalEmitted {
                token_address: signal.token_address.clone(),
                symbol: signal.symbol.clone(),
                category: signal.category,
                score: signal.score,
            });
            if self.signal_tx.send(signal).await.is_err() {
                warn!("signal channel closed, dropping signal");
            }
        }
    }

    async fn categorize(&self, token_address: &str) -> (TokenCategory, f64) {
        if let Some(existing) = self.tokens.get(token_address) {
            if existing.category != TokenCategory::Uncategorized {
                return (existing.category, existing.confidence);
            }
        }
        self.categorizer.categorize(token_address).await
    }

    /// Drop tokens with zero score not updated within the age limit.
    /// Tokens holding any score survive sweeps regardless of age.
    pub fn cleanup(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let before = self.tokens.len();
        self.tokens
            .retain(|_, m| m.score > 0.0 || m.last_update > cutoff);
        let removed = before - self.tokens.len();
        if removed > 0 {
            info!(removed, remaining = self.tokens.len(), "pruned stale tokens");
        }
        removed
    }

    /// Tokens sorted by score descending
    pub fn snapshot(&self) -> Vec<(String, TokenMetrics)> {
        let mut rows: Vec<_> = self
            .tokens
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        rows.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        rows
    }

    pub fn tracked_tokens(&self) -> usize {
        self.tokens.len()
    }
}
