//! Wallet observation pipeline: tiered polling, swap classification,
//! token categorization, and score-based signal emission.

pub mod categorizer;
pub mod metrics;
pub mod scheduler;
pub mod swap;
pub mod wallet;

pub use categorizer::{Categorizer, TokenCategory};
pub use metrics::{MetricsEngine, TradeSignal};
pub use scheduler::TierScheduler;
pub use swap::SwapFilter;
pub use wallet::{WalletRegistry, WalletStatus};
