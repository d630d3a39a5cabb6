//! JSON-lines ledger: one JSON object per line, appended

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{LedgerError, LedgerSink, TradeLogEntry, WalletLogEntry};

pub struct JsonLinesLedger {
    trades_path: PathBuf,
    wallet_path: PathBuf,
}

impl JsonLinesLedger {
    pub fn new(trades_path: impl Into<PathBuf>, wallet_path: impl Into<PathBuf>) -> Self {
        JsonLinesLedger {
            trades_path: trades_path.into(),
            wallet_path: wallet_path.into(),
        }
    }

    /// `trades.json` and `wallet_log.json` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self::new(dir.join("trades.json"), dir.join("wallet_log.json")))
    }

    pub fn trades_path(&self) -> &Path {
        &self.trades_path
    }

    pub fn wallet_path(&self) -> &Path {
        &self.wallet_path
    }

    fn append<T: Serialize>(path: &Path, record: &T) -> Result<(), LedgerError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

impl LedgerSink for JsonLinesLedger {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError> {
        Self::append(&self.trades_path, entry)
    }

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError> {
        Self::append(&self.wallet_path, entry)
    }
}
