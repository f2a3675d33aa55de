//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::monitor::categorizer::TokenCategory;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub lexicon: LexiconConfig,
    #[serde(default)]
    pub watchlist: Vec<WatchedWallet>,
}

/// A curated wallet to observe. Curation itself is an external input.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchedWallet {
    pub address: String,
    /// Reputation score used as the scoring base for this wallet's buys
    #[serde(default = "default_reputation")]
    pub reputation: f64,
}

/// Market-data provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Transactions fetched per wallet per poll
    #[serde(default = "default_tx_fetch_limit")]
    pub tx_fetch_limit: usize,
}

/// Swap-execution provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_execution_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_execution_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_execution_retry_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
}

/// Wallet polling and swap filtering settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval for VeryActive wallets (seconds)
    #[serde(default = "default_very_active_interval")]
    pub very_active_interval_secs: u64,
    /// Poll interval for Active wallets (seconds)
    #[serde(default = "default_active_interval")]
    pub active_interval_secs: u64,
    /// Poll interval for Watching wallets (seconds)
    #[serde(default = "default_watching_interval")]
    pub watching_interval_secs: u64,
    /// Poll interval for Asleep wallets (seconds)
    #[serde(default = "default_asleep_interval")]
    pub asleep_interval_secs: u64,
    /// Wallets fetched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches within one tick (milliseconds)
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Reference assets whose balance change qualifies a swap
    #[serde(default = "default_reference_assets")]
    pub reference_assets: Vec<String>,
    /// Token addresses excluded from scoring (LP tokens, stables)
    #[serde(default = "default_ignored_tokens")]
    pub ignored_tokens: Vec<String>,
    /// Minimum reference-asset amount for a swap to be scored
    #[serde(default = "default_min_reference_amount")]
    pub min_reference_amount: f64,
    /// Maintenance sweep interval (seconds)
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
    /// Idle tokens with zero score are dropped past this age
    #[serde(default = "default_cleanup_max_age_hours")]
    pub cleanup_max_age_hours: u64,
}

/// Token scoring settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Score threshold per category before a signal is emitted
    #[serde(default)]
    pub thresholds: ScoreThresholds,
    /// Weight of wallet reputation in a buy's score contribution
    #[serde(default = "default_reputation_weight")]
    pub reputation_weight: f64,
    /// Weight of trade size in a buy's score contribution
    #[serde(default = "default_volume_weight")]
    pub volume_weight: f64,
    /// Number of recent score-changing events retained per token
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreThresholds {
    #[serde(default = "default_ai_threshold")]
    pub ai: f64,
    #[serde(default = "default_meme_threshold")]
    pub meme: f64,
    #[serde(default = "default_hybrid_threshold")]
    pub hybrid: f64,
}

impl ScoreThresholds {
    /// Threshold for a category. Uncategorized tokens never signal.
    pub fn for_category(&self, category: TokenCategory) -> Option<f64> {
        match category {
            TokenCategory::Ai => Some(self.ai),
            TokenCategory::Meme => Some(self.meme),
            TokenCategory::Hybrid => Some(self.hybrid),
            TokenCategory::Uncategorized => None,
        }
    }
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            ai: default_ai_threshold(),
            meme: default_meme_threshold(),
            hybrid: default_hybrid_threshold(),
        }
    }
}

/// One take-profit rung: price up `increase` from entry, sell `sell_portion`
/// of the original entry quantity.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfitLevel {
    pub increase: f64,
    pub sell_portion: f64,
}

/// Position sizing and exit settings
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Cap shared by AI and HYBRID positions
    #[serde(default = "default_max_ai_positions")]
    pub max_ai_positions: usize,
    #[serde(default = "default_max_meme_positions")]
    pub max_meme_positions: usize,
    #[serde(default = "default_ai_entry_size")]
    pub ai_entry_size: f64,
    #[serde(default = "default_meme_entry_size")]
    pub meme_entry_size: f64,
    #[serde(default = "default_hybrid_entry_size")]
    pub hybrid_entry_size: f64,
    #[serde(default = "default_profit_levels")]
    pub profit_levels: Vec<ProfitLevel>,
    /// Stop-loss sits this fraction below entry price
    #[serde(default = "default_stop_loss_fraction")]
    pub stop_loss_fraction: f64,
    /// Open-position re-evaluation interval (seconds)
    #[serde(default = "default_position_refresh")]
    pub position_refresh_secs: u64,
}

impl TradingConfig {
    pub fn entry_size(&self, category: TokenCategory) -> f64 {
        match category {
            TokenCategory::Ai => self.ai_entry_size,
            TokenCategory::Meme => self.meme_entry_size,
            TokenCategory::Hybrid => self.hybrid_entry_size,
            TokenCategory::Uncategorized => 0.0,
        }
    }
}

/// Signal lexicons for token categorization, one list per weight tier
#[derive(Debug, Clone, Deserialize)]
pub struct LexiconConfig {
    #[serde(default = "default_primary_signals")]
    pub primary: Vec<String>,
    #[serde(default = "default_secondary_signals")]
    pub secondary: Vec<String>,
    #[serde(default = "default_context_signals")]
    pub context: Vec<String>,
}

// Default value functions

fn default_provider_url() -> String {
    "https://public-api.birdeye.so".into()
}

fn default_execution_url() -> String {
    "https://quote-api.jup.ag/v6".into()
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_execution_max_retries() -> u32 {
    5
}

fn default_execution_retry_delay_ms() -> u64 {
    1000
}

fn default_slippage_pct() -> f64 {
    1.0
}

fn default_tx_fetch_limit() -> usize {
    100
}

fn default_very_active_interval() -> u64 {
    30
}

fn default_active_interval() -> u64 {
    180
}

fn default_watching_interval() -> u64 {
    3600
}

fn default_asleep_interval() -> u64 {
    14400
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_reference_assets() -> Vec<String> {
    vec![
        // Wrapped SOL and USDC
        "So11111111111111111111111111111111111111112".into(),
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into(),
    ]
}

fn default_ignored_tokens() -> Vec<String> {
    default_reference_assets()
}

fn default_min_reference_amount() -> f64 {
    0.1
}

fn default_maintenance_interval() -> u64 {
    3600
}

fn default_cleanup_max_age_hours() -> u64 {
    24
}

fn default_reputation() -> f64 {
    50.0
}

fn default_reputation_weight() -> f64 {
    1.0
}

fn default_volume_weight() -> f64 {
    1.0
}

fn default_recent_events() -> usize {
    10
}

fn default_ai_threshold() -> f64 {
    80.0
}

fn default_meme_threshold() -> f64 {
    150.0
}

fn default_hybrid_threshold() -> f64 {
    80.0
}

fn default_max_positions() -> usize {
    10
}

fn default_max_ai_positions() -> usize {
    8
}

fn default_max_meme_positions() -> usize {
    2
}

fn default_ai_entry_size() -> f64 {
    0.05
}

fn default_meme_entry_size() -> f64 {
    0.025
}

fn default_hybrid_entry_size() -> f64 {
    0.05
}

fn default_profit_levels() -> Vec<ProfitLevel> {
    vec![
        ProfitLevel { increase: 0.6, sell_portion: 0.25 },
        ProfitLevel { increase: 1.2, sell_portion: 0.25 },
        ProfitLevel { increase: 1.8, sell_portion: 0.25 },
        ProfitLevel { increase: 2.4, sell_portion: 0.25 },
    ]
}

fn default_stop_loss_fraction() -> f64 {
    0.2
}

fn default_position_refresh() -> u64 {
    60
}

fn default_primary_signals() -> Vec<String> {
    [
        "ai", "artificial intelligence", "gpt", "claude", "llm", "backroom",
        "base model", "latent space", "ai16z",
    ]
    .map(String::from)
    .to_vec()
}

fn default_secondary_signals() -> Vec<String> {
    [
        "neural", "autonomous", "model", "intelligence", "existential",
        "infinite", "stealth", "synthetic", "consciousness", "hyperspace",
        "mindscape", "sentient", "glitch", "entropy", "fragmentation",
        "digital", "cybernetic", "distortion",
    ]
    .map(String::from)
    .to_vec()
}

fn default_context_signals() -> Vec<String> {
    [
        "pattern", "simulation", "manifold", "metameme", "egregore",
        "metacognition", "dreamtime", "semiotic", "recursive",
        "adjacent possible", "performance artist", "shattered", "reality",
        "void", "digital being", "emergence", "collective consciousness",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            tx_fetch_limit: default_tx_fetch_limit(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_url: default_execution_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_execution_max_retries(),
            retry_base_delay_ms: default_execution_retry_delay_ms(),
            slippage_pct: default_slippage_pct(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            very_active_interval_secs: default_very_active_interval(),
            active_interval_secs: default_active_interval(),
            watching_interval_secs: default_watching_interval(),
            asleep_interval_secs: default_asleep_interval(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            reference_assets: default_reference_assets(),
            ignored_tokens: default_ignored_tokens(),
            min_reference_amount: default_min_reference_amount(),
            maintenance_interval_secs: default_maintenance_interval(),
            cleanup_max_age_hours: default_cleanup_max_age_hours(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: ScoreThresholds::default(),
            reputation_weight: default_reputation_weight(),
            volume_weight: default_volume_weight(),
            recent_events: default_recent_events(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_ai_positions: default_max_ai_positions(),
            max_meme_positions: default_max_meme_positions(),
            ai_entry_size: default_ai_entry_size(),
            meme_entry_size: default_meme_entry_size(),
            hybrid_entry_size: default_hybrid_entry_size(),
            profit_levels: default_profit_levels(),
            stop_loss_fraction: default_stop_loss_fraction(),
            position_refresh_secs: default_position_refresh(),
        }
    }
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_signals(),
            secondary: default_secondary_signals(),
            context: default_context_signals(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix WHALEWATCH_)
            .add_source(
                config::Environment::with_prefix("WHALEWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints the type system cannot express
    pub fn validate(&self) -> Result<()> {
        let portion_sum: f64 = self
            .trading
            .profit_levels
            .iter()
            .map(|l| l.sell_portion)
            .sum();
        anyhow::ensure!(
            portion_sum <= 1.0 + 1e-9,
            "Take-profit sell portions sum to {portion_sum}, must not exceed 1.0"
        );
        anyhow::ensure!(
            self.trading
                .profit_levels
                .windows(2)
                .all(|w| w[0].increase < w[1].increase),
            "Take-profit levels must be in ascending order of increase"
        );
        anyhow::ensure!(
            self.trading.profit_levels.iter().all(|l| l.sell_portion > 0.0),
            "Take-profit sell portions must be positive"
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.trading.stop_loss_fraction),
            "stop_loss_fraction must be in [0, 1)"
        );
        anyhow::ensure!(
            self.monitor.batch_size > 0,
            "monitor.batch_size must be positive"
        );
        anyhow::ensure!(
            !self.monitor.reference_assets.is_empty(),
            "at least one reference asset is required"
        );
        for wallet in &self.watchlist {
            anyhow::ensure!(
                is_base58_address(&wallet.address),
                "watchlist address {:?} is not a valid base58 address",
                wallet.address
            );
        }
        Ok(())
    }
}

/// Base58 check for account addresses: length and charset only
fn is_base58_address(address: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58.contains(c))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            execution: ExecutionConfig::default(),
            monitor: MonitorConfig::default(),
            scoring: ScoringConfig::default(),
            trading: TradingConfig::default(),
            lexicon: LexiconConfig::default(),
            watchlist: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.profit_levels.len(), 4);
        assert!((config.scoring.thresholds.ai - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_portion_sum_rejected() {
        let mut config = Config::default();
        config.trading.profit_levels = vec![
            ProfitLevel { increase: 0.1, sell_portion: 0.6 },
            ProfitLevel { increase: 0.2, sell_portion: 0.6 },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_levels_must_ascend() {
        let mut config = Config::default();
        config.trading.profit_levels = vec![
            ProfitLevel { increase: 0.5, sell_portion: 0.25 },
            ProfitLevel { increase: 0.2, sell_portion: 0.25 },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_watchlist_addresses_validated() {
        let mut config = Config::default();
        config.watchlist = vec![WatchedWallet {
            address: "So11111111111111111111111111111111111111112".into(),
            reputation: 50.0,
        }];
        assert!(config.validate().is_ok());

        // "0", "O", "l" are outside the base58 alphabet
        config.watchlist[0].address = "0OlOlOlOlOlOlOlOlOlOlOlOlOlOlOlOl".into();
        assert!(config.validate().is_err());

        config.watchlist[0].address = "tooshort".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uncategorized_never_signals() {
        let thresholds = ScoreThresholds::default();
        assert!(thresholds.for_category(TokenCategory::Uncategorized).is_none());
        assert_eq!(thresholds.for_category(TokenCategory::Meme), Some(150.0));
    }
}
