//! Token categorization from metadata text
//!
//! Weighted lexical matching over name + symbol + description. Single-word
//! lexicon entries match whole words only; multi-word phrases match as
//! substrings. Metadata is cached for the process lifetime once fetched;
//! fetch failures yield Uncategorized and are retried on the next sighting.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{DataClient, TokenMetadata};
use crate::config::LexiconConfig;

const PRIMARY_WEIGHT: f64 = 0.6;
const SECONDARY_WEIGHT: f64 = 0.3;
const CONTEXT_WEIGHT: f64 = 0.2;

const AI_CONFIDENCE: f64 = 0.7;
const HYBRID_CONFIDENCE: f64 = 0.3;

/// Token category used for thresholds, caps, and sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenCategory {
    Ai,
    Meme,
    Hybrid,
    Uncategorized,
}

impl TokenCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenCategory::Ai => "AI",
            TokenCategory::Meme => "MEME",
            TokenCategory::Hybrid => "HYBRID",
            TokenCategory::Uncategorized => "UNCATEGORIZED",
        }
    }
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased lexicon tier ready for matching
#[derive(Debug, Clone)]
struct LexiconTier {
    entries: Vec<String>,
    weight: f64,
}

impl LexiconTier {
    fn new(entries: &[String], weight: f64) -> Self {
        Self {
            entries: entries.iter().map(|e| e.to_lowercase()).collect(),
            weight,
        }
    }

    /// Count matching entries in the lower-cased text
    fn matches(&self, text: &str, words: &HashSet<&str>) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                if entry.contains(char::is_whitespace) {
                    text.contains(entry.as_str())
                } else {
                    words.contains(entry.as_str())
                }
            })
            .count()
    }
}

/// Pure classifier over metadata text
#[derive(Debug, Clone)]
pub struct SignalLexicon {
    tiers: [LexiconTier; 3],
}

impl SignalLexicon {
    pub fn new(config: &LexiconConfig) -> Self {
        Self {
            tiers: [
                LexiconTier::new(&config.primary, PRIMARY_WEIGHT),
                LexiconTier::new(&config.secondary, SECONDARY_WEIGHT),
                LexiconTier::new(&config.context, CONTEXT_WEIGHT),
            ],
        }
    }

    /// Classify free text into a category with a confidence in [0, 1]
    pub fn classify(&self, text: &str) -> (TokenCategory, f64) {
        let text = text.to_lowercase();
        let words: HashSet<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let raw: f64 = self
            .tiers
            .iter()
            .map(|tier| tier.matches(&text, &words) as f64 * tier.weight)
            .sum();
        let confidence = raw.min(1.0);

        let category = if confidence >= AI_CONFIDENCE {
            TokenCategory::Ai
        } else if confidence >= HYBRID_CONFIDENCE {
            TokenCategory::Hybrid
        } else {
            TokenCategory::Meme
        };

        (category, confidence)
    }
}

/// Categorizer with a process-lifetime metadata cache
pub struct Categorizer {
    client: Arc<dyn DataClient>,
    lexicon: SignalLexicon,
    metadata_cache: DashMap<String, TokenMetadata>,
}

impl Categorizer {
    pub fn new(client: Arc<dyn DataClient>, config: &LexiconConfig) -> Self {
        Self {
            client,
            lexicon: SignalLexicon::new(config),
            metadata_cache: DashMap::new(),
        }
    }

    /// Categorize a token. A metadata fetch failure is not a classification:
    /// it yields Uncategorized at zero confidence and is not cached, so the
    /// next sighting retries the fetch.
    pub async fn categorize(&self, token_address: &str) -> (TokenCategory, f64) {
        let metadata = match self.metadata(token_address).await {
            Some(m) => m,
            None => {
                warn!(token = %token_address, "no metadata, deferring categorization");
                return (TokenCategory::Uncategorized, 0.0);
            }
        };

        let (category, confidence) = self.lexicon.classify(&metadata.text());
        info!(
            token = %token_address,
            symbol = %metadata.symbol,
            %category,
            confidence,
            "categorized token"
        );
        (category, confidence)
    }

    /// Cached metadata lookup. Metadata is treated as immutable once fetched.
    pub async fn metadata(&self, token_address: &str) -> Option<TokenMetadata> {
        if let Some(cached) = self.metadata_cache.get(token_address) {
            return Some(cached.clone());
        }

        match self.client.token_metadata(token_address).await {
            Ok(metadata) => {
                debug!(token = %token_address, "cached token metadata");
                self.metadata_cache
                    .insert(token_address.to_string(), metadata.clone());
                Some(metadata)
            }
            Err(e) => {
                warn!(token = %token_address, error = %e, "metadata fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lexicon() -> SignalLexicon {
        SignalLexicon::new(&LexiconConfig::default())
    }

    #[test]
    fn test_ai_classification() {
        // "ai" is a primary word match, "autonomous" a secondary word match
        let (category, confidence) = lexicon().classify("AI-powered autonomous agent");
        assert_eq!(category, TokenCategory::Ai);
        assert!(confidence >= 0.7);
    }

    #[test]
    fn test_plain_text_is_meme() {
        let (category, confidence) = lexicon().classify("doge to the moon");
        assert_eq!(category, TokenCategory::Meme);
        assert!(confidence < 0.3);
    }

    #[test]
    fn test_single_secondary_match_is_hybrid() {
        let (category, confidence) = lexicon().classify("a sentient frog");
        assert_eq!(category, TokenCategory::Hybrid);
        assert!((confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_word_boundary_respected() {
        // "brain" contains "ai" as a substring but not as a word
        let (category, _) = lexicon().classify("big brain token");
        assert_eq!(category, TokenCategory::Meme);
    }

    #[test]
    fn test_phrase_matches_as_substring() {
        let (_, confidence) = lexicon().classify("exploring the latent space together");
        assert!(confidence >= 0.6);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let (_, confidence) =
            lexicon().classify("ai gpt claude llm neural sentient synthetic consciousness");
        assert!((confidence - 1.0).abs() < 1e-9);
    }

    struct FlakyClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataClient for FlakyClient {
        async fn wallet_transactions(
            &self,
            _wallet: &str,
            _limit: usize,
        ) -> Result<Vec<crate::client::WalletTransaction>> {
            unimplemented!()
        }

        async fn token_metadata(&self, token: &str) -> Result<TokenMetadata> {
            // First call fails, later calls succeed
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::MetadataUnavailable(token.to_string()))
            } else {
                Ok(TokenMetadata {
                    address: token.to_string(),
                    name: "Synthetic Mind".into(),
                    symbol: "MIND".into(),
                    description: "an autonomous neural agent".into(),
                })
            }
        }

        async fn token_price(&self, _token: &str) -> Result<f64> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retried_not_latched() {
        let client = Arc::new(FlakyClient {
            calls: AtomicUsize::new(0),
        });
        let categorizer = Categorizer::new(client.clone(), &LexiconConfig::default());

        let (category, confidence) = categorizer.categorize("tok").await;
        assert_eq!(category, TokenCategory::Uncategorized);
        assert_eq!(confidence, 0.0);

        // Retry succeeds and classifies; third call hits the cache
        let (category, _) = categorizer.categorize("tok").await;
        assert_ne!(category, TokenCategory::Uncategorized);

        categorizer.categorize("tok").await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
