//! One-shot scan: fetch, filter, score and rank without trading

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use dex_momentum::ranker::Ranking;
use dex_momentum::{Config, DexScreenerClient, Engine, MarketFeed};

/// One CSV row per ranked candidate
#[derive(Debug, Serialize)]
struct ScanRow<'a> {
    rank: usize,
    symbol: &'a str,
    pair_address: &'a str,
    score: f64,
    price_native: f64,
    price_change_m5: f64,
    price_change_h1: f64,
    volume_m5: f64,
    buy_sell_ratio: f64,
    liquidity_usd: f64,
    norm_m5_change: f64,
    norm_h1_change: f64,
    norm_m5_volume: f64,
    norm_buy_sell_ratio: f64,
    norm_liquidity: f64,
}

pub fn run(config_path: Option<PathBuf>, top: usize, csv_path: Option<PathBuf>) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let feed = DexScreenerClient::new(&config.feed).context("Failed to create feed client")?;
    let batch = runtime
        .block_on(feed.fetch_snapshots())
        .context("Failed to fetch pairs")?;
    info!(
        "Fetched {} snapshots ({} dropped)",
        batch.snapshots.len(),
        batch.dropped
    );

    let ranking = Engine::new(&config).rank_batch(&batch.snapshots, Utc::now());

    println!("\n{}", "=".repeat(60));
    println!("TOP CANDIDATES");
    println!("{}", "=".repeat(60));
    println!(
        "Snapshots: {} | Eligible: {} | Entry threshold: {:.2}",
        batch.snapshots.len(),
        ranking.len(),
        config.scoring.entry_threshold
    );
    println!("{}", "-".repeat(60));
    if ranking.is_empty() {
        println!("No eligible candidates");
    }
    for line in ranking.report(top) {
        println!("{}", line);
    }
    println!("{}\n", "=".repeat(60));

    if let Some(path) = csv_path {
        export_csv(&ranking, &path)?;
        println!("Ranking exported to {}", path.display());
    }

    Ok(())
}

fn export_csv(ranking: &Ranking, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for (i, c) in ranking.iter().enumerate() {
        let s = &c.snapshot;
        writer.serialize(ScanRow {
            rank: i + 1,
            symbol: &s.base.symbol,
            pair_address: s.pair_address.as_str(),
            score: c.score,
            price_native: s.price_native,
            price_change_m5: s.price_change.m5,
            price_change_h1: s.price_change.h1,
            volume_m5: s.volume.m5,
            buy_sell_ratio: c.buy_sell_ratio,
            liquidity_usd: s.liquidity_usd,
            norm_m5_change: c.components.m5_change,
            norm_h1_change: c.components.h1_change,
            norm_m5_volume: c.components.m5_volume,
            norm_buy_sell_ratio: c.components.m5_buy_sell_ratio,
            norm_liquidity: c.components.liquidity,
        })?;
    }
    writer.flush()?;
    Ok(())
}
