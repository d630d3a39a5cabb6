//! DEX Momentum Paper Trader
//!
//! Scores decentralized-exchange pairs by short-horizon momentum and drives
//! a single simulated position through an entry/exit state machine, with
//! every action recorded to an append-only ledger.
//!
//! Per cycle: fetch a batch of pair snapshots, drop ineligible pairs,
//! min-max normalize five metrics into a composite score, rank, then either
//! evaluate exits for the held position or enter the top candidate.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use dex_momentum::{Config, DexScreenerClient, JsonLinesLedger, PaperTrader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let feed = DexScreenerClient::new(&config.feed)?;
//!     let ledger = Arc::new(JsonLinesLedger::in_dir("data")?);
//!     let mut trader = PaperTrader::new(&config, feed, ledger);
//!     trader.run(config.feed.poll_interval()).await
//! }
//! ```

pub mod config;
pub mod dexscreener;
pub mod eligibility;
pub mod engine;
pub mod feed;
pub mod ledger;
pub mod position;
pub mod ranker;
pub mod scoring;
pub mod trader;
pub mod types;
pub mod wallet;

pub use config::Config;
pub use dexscreener::{DexScreenerClient, FeedError};
pub use engine::{CycleOutcome, Decision, Engine, TradingState};
pub use feed::{MarketFeed, SnapshotBatch};
pub use ledger::{
    FanoutLedger, JsonLinesLedger, LedgerError, LedgerSink, MemoryLedger, SqliteLedger,
    TradeLogEntry, WalletLogEntry,
};
pub use position::{ExitPolicy, ExitReason, Position};
pub use trader::{CycleStatus, PaperTrader};
pub use types::*;
pub use wallet::{FeeSchedule, PaperWallet, WalletSnapshot};
