//! Paper Trading Command
//!
//! - Async event loop with graceful shutdown
//! - Crash recovery from the SQLite ledger
//! - JSON-lines trade and wallet logs

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use dex_momentum::{Config, DexScreenerClient, FanoutLedger, JsonLinesLedger, PaperTrader, SqliteLedger};

pub fn run(
    config_path: Option<PathBuf>,
    interval: Option<u64>,
    ledger_dir: Option<PathBuf>,
    fresh: bool,
) -> Result<()> {
    dotenv::dotenv().ok();

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(secs) = interval {
        config.feed.poll_interval_secs = secs;
    }
    if let Some(dir) = ledger_dir {
        config.ledger.dir = dir;
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config, fresh))
}

async fn run_async(config: Config, fresh: bool) -> Result<()> {
    info!("{}", "=".repeat(60));
    info!("DEX MOMENTUM PAPER TRADER");
    info!("{}", "=".repeat(60));
    info!("Feed: {} (q={}, chain={})", config.feed.base_url, config.feed.query, config.feed.chain_id);
    info!("Cycle interval: {} s", config.feed.poll_interval_secs);
    info!(
        "Trade size: {} SOL | fee {:.2}% per side | entry threshold {:.2}",
        config.trading.trade_size_sol,
        config.trading.fee_rate * 100.0,
        config.scoring.entry_threshold
    );
    info!(
        "Exits: TP x{} | trailing {:.1}% | liquidity drop {:.0}% | fade < {} after {} s",
        config.exit.take_profit_multiplier,
        config.exit.trailing_stop_fraction * 100.0,
        config.exit.liquidity_drop_fraction * 100.0,
        config.exit.momentum_fade_floor,
        config.exit.min_dwell_secs
    );
    info!("Ledger: {}", config.ledger.dir.display());
    info!("{}", "=".repeat(60));

    let feed = DexScreenerClient::new(&config.feed).context("Failed to create feed client")?;

    let jsonl = JsonLinesLedger::in_dir(&config.ledger.dir).with_context(|| {
        format!("Failed to open ledger dir {}", config.ledger.dir.display())
    })?;
    let mut ledger = FanoutLedger::new().with_sink(jsonl);

    let db = if config.ledger.sqlite {
        let db = Arc::new(
            SqliteLedger::open(config.ledger.db_path()).context("Failed to open SQLite ledger")?,
        );
        ledger = ledger.with_sink(db.clone());
        Some(db)
    } else {
        None
    };

    let mut trader = PaperTrader::new(&config, feed, ledger);
    if let Some(db) = db {
        trader = trader.with_checkpoints(db);
        if fresh {
            info!("--fresh given, ignoring saved checkpoints");
        } else {
            trader.recover()?;
        }
    }

    trader.run(config.feed.poll_interval()).await?;
    info!("Paper trading session ended.");
    Ok(())
}
