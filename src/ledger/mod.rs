//! Append-only trade and wallet ledger
//!
//! Records are created once per executed action (trades) or per wallet
//! mutation (wallet log) and never modified afterwards. Sinks are
//! best-effort: a failed write is reported to the caller, which logs it
//! without undoing the trade.

mod jsonl;
mod sqlite;

pub use jsonl::JsonLinesLedger;
pub use sqlite::{Checkpoint, SqliteLedger};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tracing::error;

use crate::position::Position;
use crate::{Action, PairAddress};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// One executed simulated swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub symbol: String,
    pub pair_address: PairAddress,
    /// SOL committed (BUY) or gross SOL received (SELL)
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price_native: f64,
    #[serde(rename = "feeSOL")]
    pub fee_sol: f64,
    #[serde(rename = "profitLossSOL", skip_serializing_if = "Option::is_none")]
    pub profit_loss_sol: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Holding status embedded in wallet records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSnapshot {
    pub active: bool,
    #[serde(flatten)]
    pub position: Option<Position>,
}

impl HoldingSnapshot {
    pub fn of(position: Option<&Position>) -> Self {
        HoldingSnapshot {
            active: position.is_some(),
            position: position.cloned(),
        }
    }
}

/// Wallet state after a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLogEntry {
    pub timestamp: DateTime<Utc>,
    pub sol_balance: f64,
    pub holding: HoldingSnapshot,
    pub trades_made: u32,
    pub fees_paid: f64,
}

/// Append-only persistence collaborator
pub trait LedgerSink: Send + Sync {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError>;

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError>;
}

/// Writes every record to each inner sink.
///
/// A failing sink is logged and skipped so the others still receive the
/// record; the first error is returned afterwards.
#[derive(Default)]
pub struct FanoutLedger {
    sinks: Vec<Box<dyn LedgerSink>>,
}

impl FanoutLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl LedgerSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each<F>(&self, write: F) -> Result<(), LedgerError>
    where
        F: Fn(&dyn LedgerSink) -> Result<(), LedgerError>,
    {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = write(sink.as_ref()) {
                error!("Ledger sink failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl LedgerSink for FanoutLedger {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError> {
        self.each(|sink| sink.record_trade(entry))
    }

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError> {
        self.each(|sink| sink.record_wallet(entry))
    }
}

/// In-memory sink, mainly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    trades: Mutex<Vec<TradeLogEntry>>,
    wallet: Mutex<Vec<WalletLogEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<TradeLogEntry> {
        self.trades.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn wallet_entries(&self) -> Vec<WalletLogEntry> {
        self.wallet.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl LedgerSink for MemoryLedger {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError> {
        self.trades
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError> {
        self.wallet
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }
}

impl<T: LedgerSink + ?Sized> LedgerSink for std::sync::Arc<T> {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError> {
        (**self).record_trade(entry)
    }

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError> {
        (**self).record_wallet(entry)
    }
}
