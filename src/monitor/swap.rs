//! Swap classification
//!
//! Pure functions that decide whether a raw transaction is a genuine token
//! swap worth scoring, and extract the flows the metrics engine needs.
//! No I/O happens here.

use serde::Serialize;
use std::collections::HashSet;

use crate::client::WalletTransaction;
use crate::config::MonitorConfig;

/// Trade direction from the watched wallet's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
        }
    }
}

/// One scoreable token flow extracted from a swap
#[derive(Debug, Clone)]
pub struct TokenFlow {
    pub token_address: String,
    pub symbol: String,
    pub direction: TradeDirection,
}

/// Criteria for recognizing real swaps, derived from config at startup
#[derive(Debug, Clone)]
pub struct SwapFilter {
    reference_assets: HashSet<String>,
    ignored_tokens: HashSet<String>,
    min_reference_amount: f64,
}

impl SwapFilter {
    pub fn new(config: &MonitorConfig) -> Self {
        let reference_assets: HashSet<String> =
            config.reference_assets.iter().cloned().collect();
        let mut ignored_tokens: HashSet<String> =
            config.ignored_tokens.iter().cloned().collect();
        // Reference assets are never scoreable tokens themselves
        ignored_tokens.extend(reference_assets.iter().cloned());

        Self {
            reference_assets,
            ignored_tokens,
            min_reference_amount: config.min_reference_amount,
        }
    }

    /// A real swap moves at least one non-ignored token AND a non-zero amount
    /// of a reference asset.
    pub fn is_real_swap(&self, tx: &WalletTransaction) -> bool {
        let mut reference_moved = false;
        let mut token_moved = false;

        for change in &tx.balance_changes {
            if self.reference_assets.contains(&change.address) {
                if change.ui_amount() != 0.0 {
                    reference_moved = true;
                }
            } else if !self.ignored_tokens.contains(&change.address) {
                token_moved = true;
            }
        }

        token_moved && reference_moved
    }

    /// Absolute normalized reference-asset amount moved by the swap
    pub fn reference_amount(&self, tx: &WalletTransaction) -> f64 {
        tx.balance_changes
            .iter()
            .filter(|c| self.reference_assets.contains(&c.address))
            .map(|c| c.ui_amount().abs())
            .fold(0.0, f64::max)
    }

    /// Whether the swap's reference amount clears the dust floor
    pub fn clears_dust_floor(&self, tx: &WalletTransaction) -> bool {
        self.reference_amount(tx) >= self.min_reference_amount
    }

    /// Scoreable token flows: one per non-ignored token with a non-zero
    /// change. Inflow is a buy, outflow a sell.
    pub fn token_flows(&self, tx: &WalletTransaction) -> Vec<TokenFlow> {
        tx.balance_changes
            .iter()
            .filter(|c| !self.ignored_tokens.contains(&c.address))
            .filter_map(|c| {
                let amount = c.ui_amount();
                let direction = if amount > 0.0 {
                    TradeDirection::Buy
                } else if amount < 0.0 {
                    TradeDirection::Sell
                } else {
                    return None;
                };
                Some(TokenFlow {
                    token_address: c.address.clone(),
                    symbol: c
                        .symbol
                        .clone()
                        .unwrap_or_else(|| c.address.chars().take(8).collect()),
                    direction,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BalanceChange;
    use chrono::Utc;

    const WSOL: &str = "So11111111111111111111111111111111111111112";

    fn filter() -> SwapFilter {
        SwapFilter::new(&MonitorConfig::default())
    }

    fn change(address: &str, amount: i64, decimals: u32) -> BalanceChange {
        BalanceChange {
            address: address.to_string(),
            symbol: None,
            amount,
            decimals,
        }
    }

    fn tx(changes: Vec<BalanceChange>) -> WalletTransaction {
        WalletTransaction {
            tx_hash: "sig".into(),
            block_time: Utc::now(),
            balance_changes: changes,
        }
    }

    #[test]
    fn test_token_plus_reference_is_real_swap() {
        let swap = tx(vec![
            change(WSOL, -1_500_000_000, 9),
            change("SomeTokenMint", 42_000_000, 6),
        ]);
        assert!(filter().is_real_swap(&swap));
    }

    #[test]
    fn test_reference_only_is_not_a_swap() {
        // Internal transfer: only ignored/reference assets move
        let transfer = tx(vec![change(WSOL, -1_000_000_000, 9)]);
        assert!(!filter().is_real_swap(&transfer));
    }

    #[test]
    fn test_token_only_is_not_a_swap() {
        let airdrop = tx(vec![change("SomeTokenMint", 42_000_000, 6)]);
        assert!(!filter().is_real_swap(&airdrop));
    }

    #[test]
    fn test_zero_reference_amount_does_not_qualify() {
        let weird = tx(vec![
            change(WSOL, 0, 9),
            change("SomeTokenMint", 42_000_000, 6),
        ]);
        assert!(!filter().is_real_swap(&weird));
    }

    #[test]
    fn test_reference_amount_normalization() {
        let swap = tx(vec![
            change(WSOL, -2_500_000_000, 9),
            change("SomeTokenMint", 42_000_000, 6),
        ]);
        assert!((filter().reference_amount(&swap) - 2.5).abs() < 1e-12);
        assert!(filter().clears_dust_floor(&swap));
    }

    #[test]
    fn test_dust_floor() {
        let dust = tx(vec![
            change(WSOL, -50_000_000, 9), // 0.05 < 0.1 floor
            change("SomeTokenMint", 42_000_000, 6),
        ]);
        assert!(filter().is_real_swap(&dust));
        assert!(!filter().clears_dust_floor(&dust));
    }

    #[test]
    fn test_token_flow_directions() {
        let swap = tx(vec![
            change(WSOL, -1_000_000_000, 9),
            change("BoughtMint", 10_000_000, 6),
            change("SoldMint", -5_000_000, 6),
        ]);

        let flows = filter().token_flows(&swap);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].token_address, "BoughtMint");
        assert_eq!(flows[0].direction, TradeDirection::Buy);
        assert_eq!(flows[1].direction, TradeDirection::Sell);
        // No symbol from provider: fall back to address prefix
        assert_eq!(flows[1].symbol, "SoldMint");
    }
}
