//! Snapshot normalizer
//!
//! Turns one cycle's eligible snapshots into comparable candidate scores.
//! Each of the five dimensions is min-max normalized against the batch it
//! came from, so scores only compare candidates within the same cycle.
//!
//! ```text
//! norm  = (value - min) / (max - min)        0 when max == min
//! score = Σ weight_i * norm_i                weights sum to 1.0
//! ```

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MarketSnapshot;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightsError {
    #[error("weight {name} is negative ({value})")]
    Negative { name: &'static str, value: f64 },

    #[error("weights sum to {0}, expected 1.0")]
    BadSum(f64),
}

/// Fixed weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub m5_change: f64,
    pub h1_change: f64,
    pub m5_volume: f64,
    pub m5_buy_sell_ratio: f64,
    pub liquidity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            m5_change: 0.30,
            h1_change: 0.15,
            m5_volume: 0.20,
            m5_buy_sell_ratio: 0.25,
            liquidity: 0.10,
        }
    }
}

impl ScoringWeights {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("m5_change", self.m5_change),
            ("h1_change", self.h1_change),
            ("m5_volume", self.m5_volume),
            ("m5_buy_sell_ratio", self.m5_buy_sell_ratio),
            ("liquidity", self.liquidity),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }

    pub fn validate(&self) -> Result<(), WeightsError> {
        if let Some((name, value)) = self.named().into_iter().find(|(_, w)| *w < 0.0) {
            return Err(WeightsError::Negative { name, value });
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(WeightsError::BadSum(sum));
        }
        Ok(())
    }

    /// Weighted sum of normalized components
    pub fn combine(&self, c: &ComponentScores) -> f64 {
        c.m5_change * self.m5_change
            + c.h1_change * self.h1_change
            + c.m5_volume * self.m5_volume
            + c.m5_buy_sell_ratio * self.m5_buy_sell_ratio
            + c.liquidity * self.liquidity
    }
}

/// Normalized component values, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComponentScores {
    pub m5_change: f64,
    pub h1_change: f64,
    pub m5_volume: f64,
    pub m5_buy_sell_ratio: f64,
    pub liquidity: f64,
}

/// A snapshot with its per-cycle score. Never persisted.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub snapshot: MarketSnapshot,
    pub buy_sell_ratio: f64,
    pub components: ComponentScores,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn symbol(&self) -> &str {
        &self.snapshot.base.symbol
    }
}

/// Min-max normalize `value`; a degenerate range yields 0
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range == 0.0 {
        return 0.0;
    }
    (value - min) / range
}

/// Batch minimum and maximum of one dimension
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values.minmax().into_option().unwrap_or((0.0, 0.0));
        Range { min, max }
    }

    fn normalize(&self, value: f64) -> f64 {
        normalize(value, self.min, self.max)
    }
}

/// Score a batch of eligible snapshots.
///
/// Output order matches input order. Batches with fewer than two members
/// have no spread to normalize against, so every score is forced to 0.
pub fn score_batch(snapshots: Vec<MarketSnapshot>, weights: &ScoringWeights) -> Vec<ScoredCandidate> {
    let ratios: Vec<f64> = snapshots.iter().map(|s| s.m5_buy_sell_ratio()).collect();

    if snapshots.len() < 2 {
        return snapshots
            .into_iter()
            .zip(ratios)
            .map(|(snapshot, buy_sell_ratio)| ScoredCandidate {
                snapshot,
                buy_sell_ratio,
                components: ComponentScores::default(),
                score: 0.0,
            })
            .collect();
    }

    let m5_change = Range::of(snapshots.iter().map(|s| s.price_change.m5));
    let h1_change = Range::of(snapshots.iter().map(|s| s.price_change.h1));
    let m5_volume = Range::of(snapshots.iter().map(|s| s.volume.m5));
    let ratio = Range::of(ratios.iter().copied());
    let liquidity = Range::of(snapshots.iter().map(|s| s.liquidity_usd));

    snapshots
        .into_iter()
        .zip(ratios)
        .map(|(snapshot, buy_sell_ratio)| {
            let components = ComponentScores {
                m5_change: m5_change.normalize(snapshot.price_change.m5),
                h1_change: h1_change.normalize(snapshot.price_change.h1),
                m5_volume: m5_volume.normalize(snapshot.volume.m5),
                m5_buy_sell_ratio: ratio.normalize(buy_sell_ratio),
                liquidity: liquidity.normalize(snapshot.liquidity_usd),
            };
            let score = weights.combine(&components);
            ScoredCandidate {
                snapshot,
                buy_sell_ratio,
                components,
                score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(pair: &str, m5: f64, liquidity: f64) -> MarketSnapshot {
        MarketSnapshot::new(pair, pair, 1.0, Utc::now())
            .with_price_change(m5, 1.0)
            .with_liquidity(liquidity)
            .with_volume_m5(1_000.0)
    }

    #[test]
    fn test_normalize_bounds_and_degenerate_range() {
        assert_eq!(normalize(10.0, -2.0, 10.0), 1.0);
        assert_eq!(normalize(-2.0, -2.0, 10.0), 0.0);
        assert_eq!(normalize(4.0, -2.0, 10.0), 0.5);
        assert_eq!(normalize(3.0, 3.0, 3.0), 0.0);
    }

    #[test]
    fn test_default_weights_are_valid() {
        let w = ScoringWeights::default();
        assert!(w.validate().is_ok());
        assert!((w.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_weights() {
        let w = ScoringWeights {
            liquidity: 0.2,
            ..ScoringWeights::default()
        };
        assert!(matches!(w.validate(), Err(WeightsError::BadSum(_))));

        let w = ScoringWeights {
            m5_change: -0.1,
            liquidity: 0.5,
            ..ScoringWeights::default()
        };
        assert!(matches!(
            w.validate(),
            Err(WeightsError::Negative { name: "m5_change", .. })
        ));
    }

    #[test]
    fn test_three_candidate_batch() {
        let batch = vec![
            snap("a", 10.0, 5_000.0),
            snap("b", -2.0, 8_000.0),
            snap("c", 5.0, 3_000.0),
        ];
        let scored = score_batch(batch, &ScoringWeights::default());

        assert_eq!(scored[0].components.m5_change, 1.0);
        assert_eq!(scored[1].components.m5_change, 0.0);
        assert!((scored[2].components.m5_change - 7.0 / 12.0).abs() < 1e-12);

        assert_eq!(scored[1].components.liquidity, 1.0);
        assert_eq!(scored[2].components.liquidity, 0.0);

        // identical h1 change, volume and ratio: degenerate dimensions contribute 0
        for c in &scored {
            assert_eq!(c.components.h1_change, 0.0);
            assert_eq!(c.components.m5_volume, 0.0);
            assert_eq!(c.components.m5_buy_sell_ratio, 0.0);
            assert_eq!(c.buy_sell_ratio, 0.5);
        }

        // a: 0.30 * 1.0 + 0.10 * 0.4
        assert!((scored[0].score - 0.34).abs() < 1e-12);
    }

    #[test]
    fn test_small_batches_score_zero() {
        assert!(score_batch(vec![], &ScoringWeights::default()).is_empty());

        let scored = score_batch(vec![snap("solo", 50.0, 1e6)], &ScoringWeights::default());
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].score, 0.0);
        assert_eq!(scored[0].components, ComponentScores::default());
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let batch = vec![
            snap("a", 3.0, 4_000.0).with_m5_txns(10, 2),
            snap("b", 7.0, 2_500.0).with_m5_txns(1, 9),
            snap("c", -1.0, 9_000.0).with_m5_txns(0, 0),
        ];
        let first = score_batch(batch.clone(), &ScoringWeights::default());
        let second = score_batch(batch, &ScoringWeights::default());

        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.score, y.score);
            assert_eq!(x.components, y.components);
        }
    }
}
