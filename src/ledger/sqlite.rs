// SQLite ledger
//
// Trade and wallet audit trail, crash-recovery checkpoints, and bulk
// storage of raw pair snapshots for the collector.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{LedgerError, LedgerSink, TradeLogEntry, WalletLogEntry};
use crate::position::Position;
use crate::wallet::PaperWallet;
use crate::MarketSnapshot;

// =============================================================================
// Data Models
// =============================================================================

/// Trader state persisted after every state-changing cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub cycle_count: u64,
    pub wallet: PaperWallet,
    pub position: Option<Position>,
    pub config_hash: String,
}

// =============================================================================
// Ledger Implementation
// =============================================================================

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let ledger = Self::from_connection(conn)?;
        info!("SQLite ledger opened at {}", db_path.display());
        Ok(ledger)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        let ledger = SqliteLedger {
            conn: Mutex::new(conn),
        };
        ledger.create_tables()?;
        Ok(ledger)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn create_tables(&self) -> Result<(), LedgerError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                symbol TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                sol_amount REAL NOT NULL,
                token_amount REAL NOT NULL,
                price_native REAL NOT NULL,
                fee_sol REAL NOT NULL,
                profit_loss_sol REAL,
                reason TEXT
            );

            CREATE TABLE IF NOT EXISTS wallet_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sol_balance REAL NOT NULL,
                holding TEXT NOT NULL,
                trades_made INTEGER NOT NULL,
                fees_paid REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                cycle_count INTEGER NOT NULL,
                sol_balance REAL NOT NULL,
                wallet TEXT NOT NULL,
                position TEXT,
                config_hash TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS pair_snapshots (
                timestamp TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                base_token_address TEXT NOT NULL,
                base_token_symbol TEXT NOT NULL,
                quote_token_address TEXT NOT NULL,
                quote_token_symbol TEXT NOT NULL,
                price_native REAL NOT NULL,
                price_usd REAL NOT NULL,
                liquidity_usd REAL NOT NULL,
                volume_m5 REAL NOT NULL,
                volume_h1 REAL NOT NULL,
                volume_h6 REAL NOT NULL,
                volume_h24 REAL NOT NULL,
                price_change_m5 REAL NOT NULL,
                price_change_h1 REAL NOT NULL,
                price_change_h6 REAL NOT NULL,
                price_change_h24 REAL NOT NULL,
                txns_m5_buys INTEGER NOT NULL,
                txns_m5_sells INTEGER NOT NULL,
                txns_h1_buys INTEGER NOT NULL,
                txns_h1_sells INTEGER NOT NULL,
                pair_created_at TEXT,
                PRIMARY KEY (timestamp, pair_address)
            );

            CREATE INDEX IF NOT EXISTS idx_trades_pair ON trades(pair_address);",
        )?;

        debug!("Ledger schema created/verified");
        Ok(())
    }

    pub fn save_checkpoint(&self, ckpt: &Checkpoint) -> Result<(), LedgerError> {
        let wallet_json = serde_json::to_string(&ckpt.wallet)?;
        let position_json = ckpt
            .position
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO checkpoints
             (timestamp, cycle_count, sol_balance, wallet, position, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ckpt.timestamp.to_rfc3339(),
                ckpt.cycle_count as i64,
                ckpt.wallet.sol_balance,
                wallet_json,
                position_json,
                ckpt.config_hash,
            ],
        )?;

        debug!(
            "Checkpoint saved: cycle={}, balance={:.4}, holding={}",
            ckpt.cycle_count,
            ckpt.wallet.sol_balance,
            ckpt.position.is_some()
        );
        Ok(())
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, cycle_count, wallet, position, config_hash
             FROM checkpoints ORDER BY id DESC LIMIT 1",
        )?;

        let row = stmt.query_row([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        });

        let (timestamp, cycle_count, wallet_json, position_json, config_hash) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                debug!("No checkpoint found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let checkpoint = Checkpoint {
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            cycle_count: cycle_count.max(0) as u64,
            wallet: serde_json::from_str(&wallet_json)?,
            position: position_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            config_hash,
        };

        info!(
            "Loaded checkpoint: cycle={}, balance={:.4}",
            checkpoint.cycle_count, checkpoint.wallet.sol_balance
        );
        Ok(Some(checkpoint))
    }

    /// Insert a whole batch of snapshots in one transaction; returns rows written
    pub fn insert_snapshots(&self, snapshots: &[MarketSnapshot]) -> Result<usize, LedgerError> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pair_snapshots
                 (timestamp, pair_address, base_token_address, base_token_symbol,
                  quote_token_address, quote_token_symbol, price_native, price_usd,
                  liquidity_usd, volume_m5, volume_h1, volume_h6, volume_h24,
                  price_change_m5, price_change_h1, price_change_h6, price_change_h24,
                  txns_m5_buys, txns_m5_sells, txns_h1_buys, txns_h1_sells, pair_created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            )?;

            for s in snapshots {
                written += stmt.execute(params![
                    s.observed_at.to_rfc3339(),
                    s.pair_address.as_str(),
                    s.base.address,
                    s.base.symbol,
                    s.quote.address,
                    s.quote.symbol,
                    s.price_native,
                    s.price_usd,
                    s.liquidity_usd,
                    s.volume.m5,
                    s.volume.h1,
                    s.volume.h6,
                    s.volume.h24,
                    s.price_change.m5,
                    s.price_change.h1,
                    s.price_change.h6,
                    s.price_change.h24,
                    s.txns.m5.buys,
                    s.txns.m5.sells,
                    s.txns.h1.buys,
                    s.txns.h1.sells,
                    s.pair_created_at.map(|t| t.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;

        if written != snapshots.len() {
            warn!(
                "Expected to insert {} snapshots, wrote {}",
                snapshots.len(),
                written
            );
        }
        Ok(written)
    }

    pub fn trade_count(&self) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn snapshot_count(&self) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pair_snapshots", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Sum of realized P&L over all recorded SELLs
    pub fn realized_pnl(&self) -> Result<f64, LedgerError> {
        let conn = self.conn()?;
        let pnl: Option<f64> = conn.query_row(
            "SELECT SUM(profit_loss_sol) FROM trades WHERE action = 'SELL'",
            [],
            |r| r.get(0),
        )?;
        Ok(pnl.unwrap_or(0.0))
    }
}

impl LedgerSink for SqliteLedger {
    fn record_trade(&self, entry: &TradeLogEntry) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trades
             (timestamp, action, symbol, pair_address, sol_amount, token_amount,
              price_native, fee_sol, profit_loss_sol, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.timestamp.to_rfc3339(),
                entry.action.to_string(),
                entry.symbol,
                entry.pair_address.as_str(),
                entry.sol_amount,
                entry.token_amount,
                entry.price_native,
                entry.fee_sol,
                entry.profit_loss_sol,
                entry.reason,
            ],
        )?;
        Ok(())
    }

    fn record_wallet(&self, entry: &WalletLogEntry) -> Result<(), LedgerError> {
        let holding_json = serde_json::to_string(&entry.holding)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallet_log (timestamp, sol_balance, holding, trades_made, fees_paid)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.timestamp.to_rfc3339(),
                entry.sol_balance,
                holding_json,
                entry.trades_made,
                entry.fees_paid,
            ],
        )?;
        Ok(())
    }
}
