//! Paper trading loop
//!
//! Wraps the engine with everything that touches the outside world:
//! - Fixed-interval scheduling with graceful shutdown between cycles
//! - Bounded feed fetch; a slow or failing feed skips the cycle
//! - Best-effort ledger writes
//! - Crash recovery from SQLite checkpoints

use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dexscreener::FeedError;
use crate::engine::{Decision, Engine, TradingState};
use crate::feed::{FeedGuard, MarketFeed, SnapshotBatch};
use crate::ledger::{LedgerSink, SqliteLedger, WalletLogEntry};

/// How a scheduled cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// Feed paused after repeated failures; nothing fetched
    FeedPaused,
    /// Fetch failed or timed out; no state touched
    FeedFailed(String),
    Completed(Decision),
}

pub struct PaperTrader<F, L> {
    engine: Engine,
    feed: F,
    ledger: L,
    checkpoints: Option<Arc<SqliteLedger>>,
    guard: FeedGuard,
    state: TradingState,
    fetch_timeout: Duration,
    config_hash: String,
}

impl<F: MarketFeed, L: LedgerSink> PaperTrader<F, L> {
    pub fn new(config: &Config, feed: F, ledger: L) -> Self {
        PaperTrader {
            engine: Engine::new(config),
            feed,
            ledger,
            checkpoints: None,
            guard: FeedGuard::new(config.feed.failure_threshold, config.feed.cooldown()),
            state: TradingState::new(config.trading.starting_balance_sol),
            fetch_timeout: config.feed.request_timeout(),
            config_hash: config.fingerprint(),
        }
    }

    /// Persist a checkpoint after every cycle
    pub fn with_checkpoints(mut self, db: Arc<SqliteLedger>) -> Self {
        self.checkpoints = Some(db);
        self
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Resume from the latest checkpoint; returns whether one was found
    pub fn recover(&mut self) -> Result<bool> {
        let Some(db) = &self.checkpoints else {
            return Ok(false);
        };

        info!("Recovering state from previous session...");
        let Some(ckpt) = db.load_checkpoint()? else {
            info!("No previous checkpoint found, starting fresh");
            return Ok(false);
        };

        if !ckpt.config_hash.is_empty() && ckpt.config_hash != self.config_hash {
            warn!("Config has changed since the checkpoint was written");
        }

        self.state = TradingState::from_checkpoint(ckpt);
        match &self.state.position {
            Some(pos) => info!(
                "Recovered position: {} {:.4} tokens @ {:.8} SOL (peak {:.8})",
                pos.symbol(),
                pos.amount_token,
                pos.entry_price_native,
                pos.peak_price_native
            ),
            None => info!("Recovered idle wallet"),
        }
        info!(
            "State recovery complete: cycle={}, balance={:.4} SOL",
            self.state.cycle_count, self.state.wallet.sol_balance
        );
        Ok(true)
    }

    async fn fetch(&self) -> Result<SnapshotBatch, FeedError> {
        match timeout(self.fetch_timeout, self.feed.fetch_snapshots()).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(self.fetch_timeout.as_secs())),
        }
    }

    /// Fetch one batch and run one decision cycle over it
    pub async fn run_cycle(&mut self) -> CycleStatus {
        if !self.guard.allow_fetch() {
            debug!(
                "Feed paused ({} consecutive failures), skipping cycle",
                self.guard.consecutive_failures()
            );
            return CycleStatus::FeedPaused;
        }

        let batch = match self.fetch().await {
            Ok(batch) => {
                self.guard.record_success();
                batch
            }
            Err(e) => {
                self.guard.record_failure();
                warn!("Feed fetch failed, skipping cycle: {}", e);
                return CycleStatus::FeedFailed(e.to_string());
            }
        };

        if batch.dropped > 0 {
            debug!("Dropped {} malformed pairs", batch.dropped);
        }

        let now = Utc::now();
        let outcome = self.engine.decide_cycle(&mut self.state, &batch.snapshots, now);

        if let Some(trade) = &outcome.trade {
            if let Err(e) = self.ledger.record_trade(trade) {
                error!("Failed to record {} {}: {}", trade.action, trade.symbol, e);
            }
        }
        if let Some(wallet) = &outcome.wallet {
            self.record_wallet(wallet);
        }

        self.save_checkpoint();
        CycleStatus::Completed(outcome.decision)
    }

    fn record_wallet(&self, entry: &WalletLogEntry) {
        if let Err(e) = self.ledger.record_wallet(entry) {
            error!("Failed to record wallet state: {}", e);
        }
    }

    fn save_checkpoint(&self) {
        if let Some(db) = &self.checkpoints {
            let ckpt = self.state.checkpoint(Utc::now(), &self.config_hash);
            if let Err(e) = db.save_checkpoint(&ckpt) {
                error!("Failed to save checkpoint: {}", e);
            }
        }
    }

    /// Run cycles every `period` until Ctrl+C
    pub async fn run(&mut self, period: Duration) -> Result<()> {
        self.run_until(period, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error setting up signal handler: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, initiating shutdown...");
        })
        .await
    }

    /// Run cycles every `period` until `shutdown` resolves.
    ///
    /// A cycle in progress always completes; shutdown is observed between
    /// cycles. Ticks missed while a cycle overruns are dropped, not queued.
    pub async fn run_until<S: Future<Output = ()>>(
        &mut self,
        period: Duration,
        shutdown: S,
    ) -> Result<()> {
        tokio::pin!(shutdown);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Starting trading loop (every {:?})...", period);
        self.record_wallet(&self.state.wallet_log_entry(Utc::now()));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = self.run_cycle().await;
                    debug!("Cycle {} finished: {:?}", self.state.cycle_count, status);
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        self.save_checkpoint();

        info!(
            "Session ended ({:+.2}%): {}",
            self.state.wallet.total_return_pct(),
            self.state.wallet.snapshot()
        );
        if let Some(pos) = &self.state.position {
            info!(
                "Still holding {} ({:.4} tokens, last {:.8} SOL); resumes on next start",
                pos.symbol(),
                pos.amount_token,
                pos.last_price_native
            );
        }
    }
}
