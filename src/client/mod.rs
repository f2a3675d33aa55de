//! Market-data provider boundary
//!
//! The engine only sees the `DataClient` trait; the HTTP adapter lives in
//! [`http`]. All calls are retried through a shared [`RetryPolicy`] that
//! distinguishes transient failures from permanent ones.

pub mod http;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// A single balance change inside a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Token address the change applies to
    pub address: String,
    /// Token symbol, when the provider knows it
    #[serde(default)]
    pub symbol: Option<String>,
    /// Raw integer amount, signed (negative = outflow)
    pub amount: i64,
    /// Decimal places for amount normalization
    pub decimals: u32,
}

impl BalanceChange {
    /// Amount normalized by the token's decimals
    pub fn ui_amount(&self) -> f64 {
        self.amount as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// One wallet transaction as returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub tx_hash: String,
    pub block_time: DateTime<Utc>,
    #[serde(default)]
    pub balance_changes: Vec<BalanceChange>,
}

/// Token metadata used for categorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
}

impl TokenMetadata {
    /// Combined text surface the categorizer analyzes
    pub fn text(&self) -> String {
        format!("{} {} {}", self.name, self.symbol, self.description)
    }
}

/// Read-side provider interface
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Fetch recent transactions for a wallet. Order follows the
    /// provider; callers must not assume one.
    async fn wallet_transactions(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<WalletTransaction>>;

    /// Fetch token metadata. Treated as immutable once fetched.
    async fn token_metadata(&self, token: &str) -> Result<TokenMetadata>;

    /// Latest price for a token in reference-asset units
    async fn token_price(&self, token: &str) -> Result<f64>;
}

/// Bounded retry with increasing delay, shared by the data client and the
/// execution adapter. Only errors classified retryable are retried;
/// auth/config errors propagate immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: base_delay * 8,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };

        let attempts = AtomicU32::new(0);

        retry(backoff, || async {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match op().await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "transient failure, retrying"
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) if e.is_retryable() => {
                    Err(backoff::Error::permanent(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    }))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ui_amount_normalization() {
        let change = BalanceChange {
            address: "token".into(),
            symbol: None,
            amount: 1_500_000_000,
            decimals: 9,
        };
        assert!((change.ui_amount() - 1.5).abs() < 1e-12);

        let outflow = BalanceChange {
            address: "token".into(),
            symbol: None,
            amount: -2_000_000,
            decimals: 6,
        };
        assert!((outflow.ui_amount() + 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_rate_limit() {
        // Rate-limited on attempts 1-2, succeeds on attempt 3
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result = policy
            .run("fetch", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Error::RateLimited)
                } else {
                    Ok(42u32)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_surfaced() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<()> = policy
            .run("fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<()> = policy
            .run("fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Auth("invalid key".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Auth(_))));
    }
}
