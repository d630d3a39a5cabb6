//! Eligibility filter applied before scoring
//!
//! Checks run in a fixed order and the first failing check is reported:
//! quote symbol, liquidity, 5-minute volume, then pair age.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::MarketSnapshot;

/// Why a snapshot was kept out of the scoring batch
#[derive(Debug, Clone, PartialEq)]
pub enum Ineligible {
    QuoteNotAllowed(String),
    LowLiquidity { liquidity_usd: f64, min: f64 },
    LowVolume { volume_m5_usd: f64, min: f64 },
    TooYoung { age_hours: Option<f64>, min: f64 },
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuoteNotAllowed(symbol) => write!(f, "quote {} not allowed", symbol),
            Self::LowLiquidity { liquidity_usd, min } => {
                write!(f, "liquidity ${:.0} < ${:.0}", liquidity_usd, min)
            }
            Self::LowVolume { volume_m5_usd, min } => {
                write!(f, "5m volume ${:.0} < ${:.0}", volume_m5_usd, min)
            }
            Self::TooYoung {
                age_hours: Some(age),
                min,
            } => write!(f, "age {:.2}h < {:.2}h", age, min),
            Self::TooYoung {
                age_hours: None,
                min,
            } => write!(f, "unknown creation time (need {:.2}h)", min),
        }
    }
}

/// Eligibility thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityFilter {
    pub quote_symbols: Vec<String>,
    pub min_liquidity_usd: f64,
    pub min_volume_m5_usd: f64,
    pub min_pair_age_hours: f64,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        EligibilityFilter {
            quote_symbols: vec!["SOL".to_string()],
            min_liquidity_usd: 2000.0,
            min_volume_m5_usd: 500.0,
            min_pair_age_hours: 1.0,
        }
    }
}

impl EligibilityFilter {
    /// Check a single snapshot against the thresholds
    pub fn check(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Result<(), Ineligible> {
        if !self
            .quote_symbols
            .iter()
            .any(|s| s == &snapshot.quote.symbol)
        {
            return Err(Ineligible::QuoteNotAllowed(snapshot.quote.symbol.clone()));
        }

        if snapshot.liquidity_usd < self.min_liquidity_usd {
            return Err(Ineligible::LowLiquidity {
                liquidity_usd: snapshot.liquidity_usd,
                min: self.min_liquidity_usd,
            });
        }

        if snapshot.volume.m5 < self.min_volume_m5_usd {
            return Err(Ineligible::LowVolume {
                volume_m5_usd: snapshot.volume.m5,
                min: self.min_volume_m5_usd,
            });
        }

        let min_age = Duration::milliseconds((self.min_pair_age_hours * 3_600_000.0) as i64);
        match snapshot.age_at(now) {
            Some(age) if age >= min_age => Ok(()),
            age => Err(Ineligible::TooYoung {
                age_hours: age.map(|a| a.num_milliseconds() as f64 / 3_600_000.0),
                min: self.min_pair_age_hours,
            }),
        }
    }

    /// Keep the eligible snapshots, preserving input order
    pub fn apply(&self, batch: &[MarketSnapshot], now: DateTime<Utc>) -> Vec<MarketSnapshot> {
        batch
            .iter()
            .filter(|snapshot| match self.check(snapshot, now) {
                Ok(()) => true,
                Err(reason) => {
                    trace!(
                        "{} ({}) ineligible: {}",
                        snapshot.base.symbol,
                        snapshot.pair_address,
                        reason
                    );
                    false
                }
            })
            .cloned()
            .collect()
    }
}
