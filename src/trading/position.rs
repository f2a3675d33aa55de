//! Position lifecycle: admission caps, take-profit ladder, stop-loss
//!
//! Admission (signal to open position) runs on the single signal consumer,
//! so cap checks never race each other. Each open position lives behind its
//! own async mutex; price updates for different tokens proceed in parallel
//! while updates to one position are serialized, including across the
//! executor await. State mutates only after the executor confirms a fill,
//! so a failed sell leaves the ladder exactly as it was.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::monitor::categorizer::TokenCategory;
use crate::monitor::metrics::TradeSignal;
use crate::trading::executor::ExecutionProvider;

const QUANTITY_EPSILON: f64 = 1e-9;

/// One rung of the take-profit ladder, priced at open
#[derive(Debug, Clone, Serialize)]
pub struct TakeProfit {
    pub trigger_price: f64,
    /// Fraction of the ORIGINAL quantity sold at this rung
    pub sell_portion: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    LadderComplete,
    StopLoss,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub token_address: String,
    pub symbol: String,
    pub category: TokenCategory,
    pub entry_price: f64,
    /// Last observed market price; a cache, PnL is derived from it
    pub current_price: f64,
    pub entry_quantity: f64,
    pub remaining_quantity: f64,
    pub take_profits: Vec<TakeProfit>,
    /// Ladder rungs already executed, by index
    pub levels_hit: HashSet<usize>,
    pub stop_loss_price: f64,
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed: Option<ExitReason>,
}

impl Position {
    fn open(
        signal: &TradeSignal,
        entry_price: f64,
        quantity: f64,
        config: &TradingConfig,
    ) -> Self {
        let take_profits = config
            .profit_levels
            .iter()
            .map(|level| TakeProfit {
                trigger_price: entry_price * (1.0 + level.increase),
                sell_portion: level.sell_portion,
            })
            .collect();
        Self {
            token_address: signal.token_address.clone(),
            symbol: signal.symbol.clone(),
            category: signal.category,
            entry_price,
            current_price: entry_price,
            entry_quantity: quantity,
            remaining_quantity: quantity,
            take_profits,
            levels_hit: HashSet::new(),
            stop_loss_price: entry_price * (1.0 - config.stop_loss_fraction),
            realized_pnl: 0.0,
            opened_at: Utc::now(),
            closed: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity <= QUANTITY_EPSILON
    }

    /// Recomputed from the cached price, never stored
    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.remaining_quantity
    }
}

/// Aggregate view for periodic logging
#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    pub open: usize,
    pub closed: usize,
    pub open_tokens: Vec<String>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

pub struct PositionBook {
    executor: Arc<dyn ExecutionProvider>,
    config: TradingConfig,
    open: DashMap<String, Arc<Mutex<Position>>>,
    closed: Mutex<Vec<Position>>,
    events: EventBus,
}

impl PositionBook {
    pub fn new(
        executor: Arc<dyn ExecutionProvider>,
        config: TradingConfig,
        events: EventBus,
    ) -> Self {
        Self {
            executor,
            config,
            open: DashMap::new(),
            closed: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Open a position for a signal if admission caps allow it
    pub async fn handle_signal(&self, signal: &TradeSignal) -> Result<()> {
        let entry_size = self.config.entry_size(signal.category);
        if entry_size <= 0.0 {
            warn!(token = %signal.token_address, category = %signal.category, "no entry size for category, ignoring signal");
            return Ok(());
        }
        self.check_admission(signal)?;

        let fill = self
            .executor
            .execute_buy(&signal.token_address, entry_size)
            .await?;
        if fill.quantity <= 0.0 {
            return Err(Error::EmptyFill {
                token: signal.token_address.clone(),
            });
        }

        let position = Position::open(signal, fill.price(), fill.quantity, &self.config);
        info!(
            token = %position.token_address,
            symbol = %position.symbol,
            category = %position.category,
            entry_price = position.entry_price,
            quantity = position.entry_quantity,
            tx = %fill.tx_id,
            "position opened"
        );
        self.events.publish(Event::PositionOpened {
            token_address: position.token_address.clone(),
            category: position.category,
            entry_price: position.entry_price,
        });
        self.open.insert(
            signal.token_address.clone(),
            Arc::new(Mutex::new(position)),
        );
        Ok(())
    }

    fn check_admission(&self, signal: &TradeSignal) -> Result<()> {
        if self.open.contains_key(&signal.token_address) {
            return Err(Error::PositionAlreadyOpen(signal.token_address.clone()));
        }
        let open = self.open.len();
        if open >= self.config.max_positions {
            return Err(Error::PositionLimitReached {
                open,
                max: self.config.max_positions,
            });
        }
        let (category_open, max) = match signal.category {
            // AI and HYBRID draw on the same allocation
            TokenCategory::Ai | TokenCategory::Hybrid => (
                self.count_open(|c| matches!(c, TokenCategory::Ai | TokenCategory::Hybrid)),
                self.config.max_ai_positions,
            ),
            TokenCategory::Meme => (
                self.count_open(|c| c == TokenCategory::Meme),
                self.config.max_meme_positions,
            ),
            TokenCategory::Uncategorized => return Ok(()),
        };
        if category_open >= max {
            return Err(Error::CategoryLimitReached {
                category: signal.category.as_str().to_string(),
                open: category_open,
                max,
            });
        }
        Ok(())
    }

    fn count_open(&self, pred: impl Fn(TokenCategory) -> bool) -> usize {
        self.open
            .iter()
            .filter(|entry| {
                // Category never changes after open, so a snapshot read
                // outside the position mutex is sound
                entry
                    .value()
                    .try_lock()
                    .map(|p| pred(p.category))
                    .unwrap_or(true)
            })
            .count()
    }

    /// Re-evaluate one open position at the current price. Walks every
    /// ladder rung the price has reached in ascending order, then checks
    /// the stop-loss. Safe to call with the same price repeatedly.
    pub async fn update_position(&self, token: &str, current_price: f64) -> Result<()> {
        let handle = self
            .open
            .get(token)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::PositionNotFound(token.to_string()))?;
        let mut position = handle.lock().await;
        if position.closed.is_some() {
            return Ok(());
        }
        position.current_price = current_price;

        for level in 0..position.take_profits.len() {
            if position.levels_hit.contains(&level) {
                continue;
            }
            let rung = position.take_profits[level].clone();
            if current_price < rung.trigger_price {
                break;
            }
            let quantity = (position.entry_quantity * rung.sell_portion)
                .min(position.remaining_quantity);
            if quantity <= QUANTITY_EPSILON {
                position.levels_hit.insert(level);
                continue;
            }

            let fill = self.executor.execute_sell(token, quantity).await?;
            position.remaining_quantity -= fill.quantity_sold;
            position.realized_pnl += fill.proceeds - position.entry_price * fill.quantity_sold;
            position.levels_hit.insert(level);
            info!(
                token,
                level,
                sold = fill.quantity_sold,
                remaining = position.remaining_quantity,
                realized_pnl = position.realized_pnl,
                tx = %fill.tx_id,
                "take-profit level executed"
            );
        }

        if position.is_exhausted() {
            let closed = self.close(&mut position, ExitReason::LadderComplete);
            drop(position);
            self.retire(token, closed).await;
            return Ok(());
        }

        if current_price <= position.stop_loss_price {
            let quantity = position.remaining_quantity;
            let fill = self.executor.execute_sell(token, quantity).await?;
            position.remaining_quantity -= fill.quantity_sold;
            position.realized_pnl += fill.proceeds - position.entry_price * fill.quantity_sold;
            warn!(
                token,
                current_price,
                stop = position.stop_loss_price,
                realized_pnl = position.realized_pnl,
                "stop-loss triggered"
            );
            let closed = self.close(&mut position, ExitReason::StopLoss);
            drop(position);
            self.retire(token, closed).await;
            return Ok(());
        }

        self.events.publish(Event::PositionUpdated {
            token_address: position.token_address.clone(),
            current_price,
            remaining_quantity: position.remaining_quantity,
            realized_pnl: position.realized_pnl,
            unrealized_pnl: position.unrealized_pnl(),
        });
        Ok(())
    }

    fn close(&self, position: &mut Position, reason: ExitReason) -> Position {
        position.closed = Some(reason);
        self.events.publish(Event::PositionClosed {
            token_address: position.token_address.clone(),
            realized_pnl: position.realized_pnl,
        });
        position.clone()
    }

    async fn retire(&self, token: &str, position: Position) {
        info!(
            token,
            reason = ?position.closed,
            realized_pnl = position.realized_pnl,
            "position closed"
        );
        self.open.remove(token);
        self.closed.lock().await.push(position);
    }

    pub fn open_tokens(&self) -> Vec<String> {
        self.open.iter().map(|e| e.key().clone()).collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub async fn summary(&self) -> BookSummary {
        let closed = self.closed.lock().await;
        let mut realized: f64 = closed.iter().map(|p| p.realized_pnl).sum();
        let mut unrealized = 0.0;
        let mut open_tokens = Vec::with_capacity(self.open.len());
        for entry in self.open.iter() {
            open_tokens.push(entry.key().clone());
            if let Ok(p) = entry.value().try_lock() {
                realized += p.realized_pnl;
                unrealized += p.unrealized_pnl();
            }
        }
        BookSummary {
            open: open_tokens.len(),
            closed: closed.len(),
            open_tokens,
            realized_pnl: realized,
            unrealized_pnl: unrealized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::executor::{BuyFill, SellFill};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Fills buys at a fixed price and sells at whatever price the test
    /// last set; can be told to fail sells.
    struct ScriptedExecutor {
        buy_price: f64,
        sell_price: StdMutex<f64>,
        fail_sells: AtomicBool,
        sells: AtomicUsize,
        sold_quantities: StdMutex<Vec<f64>>,
    }

    impl ScriptedExecutor {
        fn new(buy_price: f64) -> Self {
            Self {
                buy_price,
                sell_price: StdMutex::new(buy_price),
                fail_sells: AtomicBool::new(false),
                sells: AtomicUsize::new(0),
                sold_quantities: StdMutex::new(Vec::new()),
            }
        }

        fn set_sell_price(&self, price: f64) {
            *self.sell_price.lock().unwrap() = price;
        }
    }

    #[async_trait]
    impl ExecutionProvider for ScriptedExecutor {
        async fn execute_buy(&self, _token: &str, amount_in: f64) -> Result<BuyFill> {
            Ok(BuyFill {
                quantity: amount_in / self.buy_price,
                amount_in,
                tx_id: "buy-tx".into(),
            })
        }

        async fn execute_sell(&self, _token: &str, quantity: f64) -> Result<SellFill> {
            if self.fail_sells.load(Ordering::SeqCst) {
                return Err(Error::SwapRejected("scripted failure".into()));
            }
            self.sells.fetch_add(1, Ordering::SeqCst);
            self.sold_quantities.lock().unwrap().push(quantity);
            Ok(SellFill {
                proceeds: quantity * *self.sell_price.lock().unwrap(),
                quantity_sold: quantity,
                tx_id: "sell-tx".into(),
            })
        }
    }

    fn config() -> TradingConfig {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    fn signal(token: &str, category: TokenCategory) -> TradeSignal {
        TradeSignal {
            token_address: token.into(),
            symbol: token.into(),
            category,
            score: 100.0,
            confidence: 0.9,
        }
    }

    fn book(executor: Arc<ScriptedExecutor>, config: TradingConfig) -> PositionBook {
        PositionBook::new(executor, config, EventBus::default())
    }

    #[tokio::test]
    async fn test_ladder_sells_portions_of_original_quantity() {
        // Entry at 1.0; defaults: +60/120/180/240%, each 25% of original
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor.clone(), config());
        book.handle_signal(&signal("tok", TokenCategory::Ai))
            .await
            .unwrap();

        // Price jumps over the first two rungs at once: both fire, ascending
        executor.set_sell_price(2.3);
        book.update_position("tok", 2.3).await.unwrap();
        assert_eq!(executor.sells.load(Ordering::SeqCst), 2);
        let sold = executor.sold_quantities.lock().unwrap().clone();
        let quarter = 0.05 / 4.0;
        assert!((sold[0] - quarter).abs() < 1e-12);
        assert!((sold[1] - quarter).abs() < 1e-12);

        // Same price again: ladder is idempotent
        book.update_position("tok", 2.3).await.unwrap();
        assert_eq!(executor.sells.load(Ordering::SeqCst), 2);

        // Final rung exhausts the position and closes it
        executor.set_sell_price(3.5);
        book.update_position("tok", 3.5).await.unwrap();
        assert_eq!(executor.sells.load(Ordering::SeqCst), 4);
        assert_eq!(book.open_count(), 0);
        let summary = book.summary().await;
        assert_eq!(summary.closed, 1);
        assert!(summary.realized_pnl > 0.0);
    }

    #[tokio::test]
    async fn test_stop_loss_exits_full_remaining() {
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor.clone(), config());
        book.handle_signal(&signal("tok", TokenCategory::Ai))
            .await
            .unwrap();

        // Default stop sits 20% below entry
        executor.set_sell_price(0.7);
        book.update_position("tok", 0.7).await.unwrap();
        assert_eq!(executor.sells.load(Ordering::SeqCst), 1);
        let sold = executor.sold_quantities.lock().unwrap().clone();
        assert!((sold[0] - 0.05).abs() < 1e-12);
        assert_eq!(book.open_count(), 0);
        let summary = book.summary().await;
        assert!(summary.realized_pnl < 0.0);
    }

    #[tokio::test]
    async fn test_failed_sell_leaves_ladder_untouched() {
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor.clone(), config());
        book.handle_signal(&signal("tok", TokenCategory::Ai))
            .await
            .unwrap();

        executor.fail_sells.store(true, Ordering::SeqCst);
        assert!(book.update_position("tok", 2.0).await.is_err());
        assert_eq!(book.open_count(), 1);

        // Next pass at the same price retries the same rung
        executor.fail_sells.store(false, Ordering::SeqCst);
        executor.set_sell_price(2.0);
        book.update_position("tok", 2.0).await.unwrap();
        assert_eq!(executor.sells.load(Ordering::SeqCst), 1);
        assert_eq!(book.open_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_signal_rejected() {
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor, config());
        book.handle_signal(&signal("tok", TokenCategory::Ai))
            .await
            .unwrap();
        let err = book
            .handle_signal(&signal("tok", TokenCategory::Ai))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PositionAlreadyOpen(_)));
    }

    #[tokio::test]
    async fn test_ai_and_hybrid_share_a_cap() {
        let mut cfg = config();
        cfg.max_ai_positions = 2;
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor, cfg);

        book.handle_signal(&signal("a", TokenCategory::Ai))
            .await
            .unwrap();
        book.handle_signal(&signal("b", TokenCategory::Hybrid))
            .await
            .unwrap();
        let err = book
            .handle_signal(&signal("c", TokenCategory::Ai))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CategoryLimitReached { .. }));

        // MEME draws on its own allocation
        book.handle_signal(&signal("d", TokenCategory::Meme))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_global_cap_enforced() {
        let mut cfg = config();
        cfg.max_positions = 1;
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor, cfg);

        book.handle_signal(&signal("a", TokenCategory::Ai))
            .await
            .unwrap();
        let err = book
            .handle_signal(&signal("b", TokenCategory::Meme))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PositionLimitReached { .. }));
    }

    #[tokio::test]
    async fn test_closed_position_frees_its_slot() {
        let mut cfg = config();
        cfg.max_positions = 1;
        let executor = Arc::new(ScriptedExecutor::new(1.0));
        let book = book(executor.clone(), cfg);

        book.handle_signal(&signal("a", TokenCategory::Ai))
            .await
            .unwrap();
        executor.set_sell_price(0.5);
        book.update_position("a", 0.5).await.unwrap();

        book.handle_signal(&signal("b", TokenCategory::Ai))
            .await
            .unwrap();
    }
}
