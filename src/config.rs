//! Configuration management
//!
//! Handles loading and validation of the JSON configuration file. Every
//! section is optional and falls back to the defaults below; a handful of
//! settings can be overridden from the environment (or a `.env` file).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::eligibility::EligibilityFilter;
use crate::position::ExitPolicy;
use crate::scoring::ScoringWeights;
use crate::wallet::FeeSchedule;

/// Overrides `feed.base_url`
pub const ENV_FEED_URL: &str = "DEXM_FEED_URL";
/// Overrides `trading.starting_balance_sol`
pub const ENV_STARTING_BALANCE: &str = "DEXM_STARTING_BALANCE";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub trading: TradingConfig,
    pub filters: EligibilityFilter,
    pub scoring: ScoringConfig,
    pub exit: ExitPolicy,
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from JSON file and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let mut config = Config::default();
                config.apply_env_overrides()?;
                Ok(config)
            }
        }
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_FEED_URL) {
            self.feed.base_url = url;
        }
        if let Ok(raw) = std::env::var(ENV_STARTING_BALANCE) {
            self.trading.starting_balance_sol = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a number: {:?}", ENV_STARTING_BALANCE, raw))?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;
        if !(t.trade_size_sol > 0.0) {
            bail!("trading.trade_size_sol must be positive, got {}", t.trade_size_sol);
        }
        if !(0.0..1.0).contains(&t.fee_rate) {
            bail!("trading.fee_rate must be in [0, 1), got {}", t.fee_rate);
        }
        if !(t.starting_balance_sol >= 0.0) {
            bail!(
                "trading.starting_balance_sol must not be negative, got {}",
                t.starting_balance_sol
            );
        }

        self.scoring
            .weights
            .validate()
            .context("Invalid scoring.weights")?;
        if !(0.0..=1.0).contains(&self.scoring.entry_threshold) {
            bail!(
                "scoring.entry_threshold must be in [0, 1], got {}",
                self.scoring.entry_threshold
            );
        }

        let e = &self.exit;
        for (name, value) in [
            ("exit.trailing_stop_fraction", e.trailing_stop_fraction),
            ("exit.liquidity_drop_fraction", e.liquidity_drop_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be in [0, 1], got {}", name, value);
            }
        }
        if !(e.take_profit_multiplier > 1.0) {
            bail!(
                "exit.take_profit_multiplier must be greater than 1, got {}",
                e.take_profit_multiplier
            );
        }
        if e.max_missing_cycles == Some(0) {
            bail!("exit.max_missing_cycles must be at least 1 when set");
        }

        if self.feed.poll_interval_secs == 0 {
            bail!("feed.poll_interval_secs must be positive");
        }
        if self.feed.request_timeout_secs == 0 {
            bail!("feed.request_timeout_secs must be positive");
        }

        Ok(())
    }

    /// Stable hash of the effective configuration, stored with checkpoints
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Upstream market data settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub query: String,
    pub chain_id: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Consecutive fetch failures before cycles are skipped
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            base_url: "https://api.dexscreener.com".to_string(),
            query: "SOL".to_string(),
            chain_id: "solana".to_string(),
            request_timeout_secs: 10,
            poll_interval_secs: 30,
            failure_threshold: 5,
            cooldown_secs: 120,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Trade sizing and simulated fees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub starting_balance_sol: f64,
    pub trade_size_sol: f64,
    /// Per side, applied to entry cost and exit proceeds
    pub fee_rate: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        let fees = FeeSchedule::default();
        TradingConfig {
            starting_balance_sol: 10.0,
            trade_size_sol: fees.trade_size_sol,
            fee_rate: fees.fee_rate,
        }
    }
}

impl TradingConfig {
    pub fn fees(&self) -> FeeSchedule {
        FeeSchedule {
            trade_size_sol: self.trade_size_sol,
            fee_rate: self.fee_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Minimum composite score required to enter
    pub entry_threshold: f64,
    /// Candidates shown in the per-cycle report
    pub top_scorers: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            weights: ScoringWeights::default(),
            entry_threshold: 0.65,
            top_scorers: 10,
        }
    }
}

/// Where trades, wallet history and checkpoints are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub dir: PathBuf,
    /// Also keep a SQLite ledger (required for checkpoints)
    pub sqlite: bool,
    pub db_file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            dir: PathBuf::from("data"),
            sqlite: true,
            db_file: "ledger.db".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(&self.db_file)
    }
}
