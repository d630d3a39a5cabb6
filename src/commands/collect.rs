//! Snapshot collector: polls the feed and bulk-inserts every batch into SQLite

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use dex_momentum::{Config, DexScreenerClient, MarketFeed, SqliteLedger};

pub fn run(config_path: Option<PathBuf>, db_path: PathBuf, interval_secs: Option<u64>) -> Result<()> {
    dotenv::dotenv().ok();

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(secs) = interval_secs {
        config.feed.poll_interval_secs = secs;
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config, db_path))
}

async fn run_async(config: Config, db_path: PathBuf) -> Result<()> {
    let db = SqliteLedger::open(&db_path)
        .with_context(|| format!("Failed to open snapshot db {}", db_path.display()))?;
    let feed = DexScreenerClient::new(&config.feed).context("Failed to create feed client")?;
    let fetch_timeout = config.feed.request_timeout();

    info!(
        "Collecting {} pairs (q={}) every {} s into {}",
        config.feed.chain_id,
        config.feed.query,
        config.feed.poll_interval_secs,
        db_path.display()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = interval(Duration::from_secs(config.feed.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut total = 0usize;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = match timeout(fetch_timeout, feed.fetch_snapshots()).await {
                    Ok(Ok(batch)) => batch,
                    Ok(Err(e)) => {
                        warn!("Fetch failed, skipping: {}", e);
                        continue;
                    }
                    Err(_) => {
                        warn!("Fetch timed out after {:?}, skipping", fetch_timeout);
                        continue;
                    }
                };

                match db.insert_snapshots(&batch.snapshots) {
                    Ok(n) => {
                        total += n;
                        info!(
                            "Stored {} snapshots ({} dropped, {} total)",
                            n, batch.dropped, total
                        );
                    }
                    Err(e) => error!("Snapshot insert failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl+C, stopping collector");
                break;
            }
        }
    }

    info!("Collector stopped after storing {} snapshots", total);
    Ok(())
}
