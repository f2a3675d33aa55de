//! Swap execution adapters
//!
//! The position manager talks to an [`ExecutionProvider`]; which adapter
//! backs it is a startup decision. The HTTP adapter drives an aggregator's
//! quote-then-swap flow; the simulated adapter fills at the observed market
//! price and is the only provider used in dry-run mode.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{DataClient, RetryPolicy};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};

/// Result of an executed buy
#[derive(Debug, Clone)]
pub struct BuyFill {
    /// Tokens received, normalized
    pub quantity: f64,
    /// Reference-asset amount spent
    pub amount_in: f64,
    pub tx_id: String,
}

impl BuyFill {
    /// Effective entry price in reference-asset units per token
    pub fn price(&self) -> f64 {
        self.amount_in / self.quantity
    }
}

/// Result of an executed sell
#[derive(Debug, Clone)]
pub struct SellFill {
    /// Reference-asset amount received
    pub proceeds: f64,
    pub quantity_sold: f64,
    pub tx_id: String,
}

#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Spend `amount_in` reference units buying `token`
    async fn execute_buy(&self, token: &str, amount_in: f64) -> Result<BuyFill>;

    /// Sell `quantity` of `token` back into the reference asset
    async fn execute_sell(&self, token: &str, quantity: f64) -> Result<SellFill>;
}

/// Aggregator-backed executor using the quote-then-swap flow
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    slippage_pct: f64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: f64,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "txId")]
    tx_id: String,
    #[serde(rename = "outAmount")]
    out_amount: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    expected: f64,
    #[serde(default)]
    actual: f64,
}

impl HttpExecutor {
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            slippage_pct: config.slippage_pct,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        })
    }

    async fn quote(&self, token: &str, side: &str, amount: f64) -> Result<QuoteResponse> {
        let url = format!("{}/v6/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("token", token.to_string()),
                ("side", side.to_string()),
                ("amount", amount.to_string()),
                ("slippagePct", self.slippage_pct.to_string()),
            ])
            .send()
            .await?;
        Self::checked(response).await
    }

    async fn swap(&self, quote: &QuoteResponse, token: &str, side: &str, amount: f64) -> Result<SwapResponse> {
        let url = format!("{}/v6/swap", self.base_url);
        let min_out = quote.out_amount * (1.0 - self.slippage_pct / 100.0);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "token": token,
                "side": side,
                "amount": amount,
                "minOut": min_out,
            }))
            .send()
            .await?;
        Self::checked(response).await
    }

    async fn checked<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
            return Err(match parsed {
                Some(e) if e.code == "SLIPPAGE_EXCEEDED" => Error::SlippageExceeded {
                    expected: e.expected,
                    actual: e.actual,
                },
                Some(e) if e.code == "INSUFFICIENT_FUNDS" => Error::InsufficientFunds {
                    available: e.actual,
                    required: e.expected,
                },
                Some(e) => Error::SwapRejected(format!("{status}: {}", e.message)),
                None => Error::SwapRejected(format!("{status}: {body}")),
            });
        }
        Ok(response.json().await?)
    }

    async fn execute(&self, token: &str, side: &str, amount: f64) -> Result<SwapResponse> {
        self.retry
            .run("execute_swap", || async {
                let quote = self.quote(token, side, amount).await?;
                self.swap(&quote, token, side, amount).await
            })
            .await
    }
}

#[async_trait]
impl ExecutionProvider for HttpExecutor {
    async fn execute_buy(&self, token: &str, amount_in: f64) -> Result<BuyFill> {
        let swap = self.execute(token, "buy", amount_in).await?;
        if swap.out_amount <= 0.0 {
            return Err(Error::EmptyFill {
                token: token.to_string(),
            });
        }
        info!(token, amount_in, quantity = swap.out_amount, tx = %swap.tx_id, "buy executed");
        Ok(BuyFill {
            quantity: swap.out_amount,
            amount_in,
            tx_id: swap.tx_id,
        })
    }

    async fn execute_sell(&self, token: &str, quantity: f64) -> Result<SellFill> {
        let swap = self.execute(token, "sell", quantity).await?;
        info!(token, quantity, proceeds = swap.out_amount, tx = %swap.tx_id, "sell executed");
        Ok(SellFill {
            proceeds: swap.out_amount,
            quantity_sold: quantity,
            tx_id: swap.tx_id,
        })
    }
}

/// Fills at the last observed market price. No funds move.
pub struct SimulatedExecutor {
    client: Arc<dyn DataClient>,
}

impl SimulatedExecutor {
    pub fn new(client: Arc<dyn DataClient>) -> Self {
        Self { client }
    }

    async fn price(&self, token: &str) -> Result<f64> {
        let price = self.client.token_price(token).await?;
        if price <= 0.0 {
            return Err(Error::EmptyFill {
                token: token.to_string(),
            });
        }
        Ok(price)
    }
}

#[async_trait]
impl ExecutionProvider for SimulatedExecutor {
    async fn execute_buy(&self, token: &str, amount_in: f64) -> Result<BuyFill> {
        let price = self.price(token).await?;
        let fill = BuyFill {
            quantity: amount_in / price,
            amount_in,
            tx_id: format!("sim-{}", Uuid::new_v4()),
        };
        debug!(token, amount_in, price, quantity = fill.quantity, "simulated buy");
        Ok(fill)
    }

    async fn execute_sell(&self, token: &str, quantity: f64) -> Result<SellFill> {
        let price = self.price(token).await?;
        let fill = SellFill {
            proceeds: quantity * price,
            quantity_sold: quantity,
            tx_id: format!("sim-{}", Uuid::new_v4()),
        };
        debug!(token, quantity, price, proceeds = fill.proceeds, "simulated sell");
        Ok(fill)
    }
}
