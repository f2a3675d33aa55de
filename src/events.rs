//! Internal event stream for observability consumers

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::monitor::categorizer::TokenCategory;
use crate::monitor::metrics::TokenMetrics;

/// Events published on the internal bus; consumers subscribe via [`EventBus`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TransactionObserved {
        wallet: String,
        tx_hash: String,
        block_time: DateTime<Utc>,
    },
    SignalEmitted {
        token_address: String,
        symbol: String,
        category: TokenCategory,
        score: f64,
    },
    PositionOpened {
        token_address: String,
        category: TokenCategory,
        entry_price: f64,
    },
    PositionUpdated {
        token_address: String,
        current_price: f64,
        remaining_quantity: f64,
        realized_pnl: f64,
        unrealized_pnl: f64,
    },
    PositionClosed {
        token_address: String,
        realized_pnl: f64,
    },
    WalletStatusCounts {
        very_active: usize,
        active: usize,
        watching: usize,
        asleep: usize,
        transactions_processed: u64,
    },
    MetricsSnapshot {
        tokens: Vec<(String, TokenMetrics)>,
        open_positions: Vec<String>,
    },
}

/// Broadcast bus. Slow subscribers lag rather than block the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish, ignoring the no-subscriber case
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(Event::WalletStatusCounts {
            very_active: 0,
            active: 0,
            watching: 0,
            asleep: 0,
            transactions_processed: 0,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(Event::TransactionObserved {
            wallet: "w".into(),
            tx_hash: "t".into(),
            block_time: Utc::now(),
        });
        match rx.recv().await.unwrap() {
            Event::TransactionObserved { wallet, .. } => assert_eq!(wallet, "w"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
