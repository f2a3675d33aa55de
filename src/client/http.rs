//! HTTP adapter for the market-data provider
//!
//! Endpoint shapes follow the provider's REST API: wallet transaction lists,
//! per-token metadata, and spot prices. Every call goes through the shared
//! retry policy; malformed transaction rows are skipped without failing the
//! batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{BalanceChange, DataClient, RetryPolicy, TokenMetadata, WalletTransaction};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

const API_KEY_ENV: &str = "PROVIDER_API_KEY";

/// Map an error status to the retry taxonomy
fn status_error(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(body),
        _ => Error::Http(format!("status {status}: {body}")),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TxListData {
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(rename = "txHash")]
    tx_hash: String,
    #[serde(rename = "blockTime")]
    block_time: DateTime<Utc>,
    #[serde(rename = "balanceChange", default)]
    balance_change: Vec<RawBalanceChange>,
}

#[derive(Debug, Deserialize)]
struct RawBalanceChange {
    address: String,
    #[serde(default)]
    symbol: Option<String>,
    amount: i64,
    decimals: u32,
}

#[derive(Debug, Deserialize)]
struct MetadataData {
    address: String,
    name: String,
    symbol: String,
    #[serde(default)]
    extensions: Option<MetadataExtensions>,
}

#[derive(Debug, Deserialize)]
struct MetadataExtensions {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    value: f64,
}

/// Provider client with retry and auth header handling
pub struct HttpDataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpDataClient {
    /// Create a client from config. The API key comes from the environment.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::MissingEnvVar(API_KEY_ENV.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let envelope: Envelope<T> = response.json().await?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(Error::Http(format!("provider returned no data for {path}"))),
        }
    }
}

#[async_trait]
impl DataClient for HttpDataClient {
    async fn wallet_transactions(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<WalletTransaction>> {
        let data: TxListData = self
            .retry
            .run("wallet_transactions", || async {
                self.get_json(
                    "/v1/wallet/tx_list",
                    &[("wallet", wallet.to_string()), ("limit", limit.to_string())],
                )
                .await
            })
            .await?;

        // Parse row by row so one malformed record cannot poison the batch
        let mut transactions = Vec::with_capacity(data.transactions.len());
        for row in data.transactions {
            match serde_json::from_value::<RawTransaction>(row) {
                Ok(raw) => transactions.push(WalletTransaction {
                    tx_hash: raw.tx_hash,
                    block_time: raw.block_time,
                    balance_changes: raw
                        .balance_change
                        .into_iter()
                        .map(|c| BalanceChange {
                            address: c.address,
                            symbol: c.symbol,
                            amount: c.amount,
                            decimals: c.decimals,
                        })
                        .collect(),
                }),
                Err(e) => {
                    let err = Error::MalformedRecord(e.to_string());
                    warn!(wallet, error = %err, "skipping malformed transaction record");
                }
            }
        }

        debug!(wallet, count = transactions.len(), "fetched wallet transactions");
        Ok(transactions)
    }

    async fn token_metadata(&self, token: &str) -> Result<TokenMetadata> {
        let data: MetadataData = self
            .retry
            .run("token_metadata", || async {
                self.get_json(
                    "/defi/v3/token/meta-data/single",
                    &[("address", token.to_string())],
                )
                .await
            })
            .await
            .map_err(|e| match e {
                e if e.is_fatal() => e,
                _ => Error::MetadataUnavailable(token.to_string()),
            })?;

        Ok(TokenMetadata {
            address: data.address,
            name: data.name,
            symbol: data.symbol,
            description: data
                .extensions
                .and_then(|e| e.description)
                .unwrap_or_default(),
        })
    }

    async fn token_price(&self, token: &str) -> Result<f64> {
        let data: PriceData = self
            .retry
            .run("token_price", || async {
                self.get_json("/v1/token/price", &[("address", token.to_string())])
                    .await
            })
            .await?;

        Ok(data.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            Error::RateLimited
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key".into()),
            Error::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            Error::Http(_)
        ));
    }

    #[test]
    fn test_malformed_rows_are_isolated() {
        let rows = vec![
            serde_json::json!({
                "txHash": "abc",
                "blockTime": "2025-06-01T12:00:00Z",
                "balanceChange": [
                    {"address": "tok", "amount": 100, "decimals": 6}
                ]
            }),
            serde_json::json!({"garbage": true}),
        ];

        let parsed: Vec<RawTransaction> = rows
            .into_iter()
            .filter_map(|r| serde_json::from_value(r).ok())
            .collect();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tx_hash, "abc");
        assert_eq!(parsed[0].balance_change[0].amount, 100);
    }
}
