//! Wallet registry and derived activity status
//!
//! Status is never stored: it is a pure function of (now − last_active), so a
//! wallet migrates between polling tiers simply by being re-read. Wallets are
//! never removed once registered.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::WatchedWallet;

/// Wallet activity tier, derived from time since last activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WalletStatus {
    VeryActive,
    Active,
    Watching,
    Asleep,
}

impl WalletStatus {
    /// Derive status from idle time. Boundaries: 15 min / 1 h / 4 h.
    pub fn from_idle(idle: Duration) -> Self {
        if idle <= Duration::minutes(15) {
            WalletStatus::VeryActive
        } else if idle <= Duration::hours(1) {
            WalletStatus::Active
        } else if idle <= Duration::hours(4) {
            WalletStatus::Watching
        } else {
            WalletStatus::Asleep
        }
    }

    pub const ALL: [WalletStatus; 4] = [
        WalletStatus::VeryActive,
        WalletStatus::Active,
        WalletStatus::Watching,
        WalletStatus::Asleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::VeryActive => "VERY_ACTIVE",
            WalletStatus::Active => "ACTIVE",
            WalletStatus::Watching => "WATCHING",
            WalletStatus::Asleep => "ASLEEP",
        }
    }
}

/// A watched wallet's tracked state
#[derive(Debug, Clone, Serialize)]
pub struct WalletRecord {
    pub address: String,
    pub last_active: DateTime<Utc>,
    pub transaction_count: u64,
    pub reputation: f64,
}

impl WalletRecord {
    /// Derived activity status at `now`
    pub fn status(&self, now: DateTime<Utc>) -> WalletStatus {
        WalletStatus::from_idle(now - self.last_active)
    }
}

/// Shared registry of watched wallets
pub struct WalletRegistry {
    wallets: DashMap<String, WalletRecord>,
}

impl WalletRegistry {
    /// Seed the registry from the curated watchlist. New wallets start with
    /// no known activity, so they land in the Asleep tier until first seen.
    pub fn from_watchlist(watchlist: &[WatchedWallet], now: DateTime<Utc>) -> Self {
        let wallets = DashMap::new();
        for entry in watchlist {
            wallets.insert(
                entry.address.clone(),
                WalletRecord {
                    address: entry.address.clone(),
                    last_active: now - Duration::hours(5),
                    transaction_count: 0,
                    reputation: entry.reputation.max(0.0),
                },
            );
        }
        Self { wallets }
    }

    /// Record observed activity. Promotes the wallet on the next status read;
    /// last_active only moves forward.
    pub fn record_activity(&self, address: &str, at: DateTime<Utc>) {
        let mut record = self
            .wallets
            .entry(address.to_string())
            .or_insert_with(|| WalletRecord {
                address: address.to_string(),
                last_active: at,
                transaction_count: 0,
                reputation: 0.0,
            });
        record.last_active = record.last_active.max(at);
        record.transaction_count += 1;
        debug!(wallet = %address, at = %at, "recorded wallet activity");
    }

    /// Reputation score for a wallet, clamped non-negative
    pub fn reputation(&self, address: &str) -> f64 {
        self.wallets
            .get(address)
            .map(|r| r.reputation.max(0.0))
            .unwrap_or(0.0)
    }

    /// Addresses whose derived status equals `tier` at `now`
    pub fn members_of(&self, tier: WalletStatus, now: DateTime<Utc>) -> Vec<String> {
        self.wallets
            .iter()
            .filter(|entry| entry.status(now) == tier)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// All registered addresses
    pub fn addresses(&self) -> Vec<String> {
        self.wallets.iter().map(|e| e.key().clone()).collect()
    }

    /// Wallet count per derived status
    pub fn status_counts(&self, now: DateTime<Utc>) -> HashMap<WalletStatus, usize> {
        let mut counts: HashMap<WalletStatus, usize> =
            WalletStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for entry in self.wallets.iter() {
            *counts.entry(entry.status(now)).or_insert(0) += 1;
        }
        counts
    }

    /// Total transactions observed across all wallets
    pub fn total_transactions(&self) -> u64 {
        self.wallets.iter().map(|e| e.transaction_count).sum()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
