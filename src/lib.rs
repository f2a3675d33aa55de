//! Wallet observation and signal-driven position engine
//!
//! Watches a curated set of wallets, scores the tokens they trade, and
//! opens laddered positions when a token's score crosses its category
//! threshold.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
