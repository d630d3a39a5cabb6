//! Open position and exit rules
//!
//! Exit triggers are checked in a fixed priority order and the first match
//! wins. The conditions overlap (a collapsing pool can also be in profit),
//! so the order itself is the policy:
//!
//! 1. Liquidity drop: liquidity < entry liquidity * (1 - liquidity_drop_fraction)
//! 2. Trailing stop: price <= peak price * (1 - trailing_stop_fraction)
//! 3. Take profit: price >= entry price * take_profit_multiplier
//! 4. Momentum fade: 5m change < floor, once the minimum dwell has elapsed

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MarketSnapshot, PairAddress, TokenRef};

/// Exit thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    pub take_profit_multiplier: f64,
    pub trailing_stop_fraction: f64,
    pub liquidity_drop_fraction: f64,
    /// Same units as the feed's 5m price change (percentage points)
    pub momentum_fade_floor: f64,
    pub min_dwell_secs: u64,
    /// Close at the last seen price after this many cycles without data.
    /// `None` keeps the position indefinitely.
    pub max_missing_cycles: Option<u32>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy {
            take_profit_multiplier: 1.05,
            trailing_stop_fraction: 0.03,
            liquidity_drop_fraction: 0.30,
            momentum_fade_floor: 0.001,
            min_dwell_secs: 300,
            max_missing_cycles: None,
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    LiquidityDrop { threshold_usd: f64 },
    TrailingStop { stop_price: f64 },
    TakeProfit,
    MomentumFade { floor: f64 },
    DataUnavailable { missing_cycles: u32 },
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiquidityDrop { threshold_usd } => {
                write!(f, "Liquidity Drop (< {:.0} USD)", threshold_usd)
            }
            Self::TrailingStop { stop_price } => {
                write!(f, "Trailing Stop Loss (<= {:.8} SOL)", stop_price)
            }
            Self::TakeProfit => write!(f, "Take Profit"),
            Self::MomentumFade { floor } => write!(f, "Momentum Fade (m5 < {}%)", floor),
            Self::DataUnavailable { missing_cycles } => {
                write!(f, "Data Unavailable ({} cycles)", missing_cycles)
            }
        }
    }
}

impl ExitPolicy {
    pub fn min_dwell(&self) -> Duration {
        Duration::seconds(self.min_dwell_secs as i64)
    }

    /// First exit trigger that fires for `position` given the current snapshot.
    ///
    /// Expects the position's peak to already include `current`.
    pub fn evaluate(
        &self,
        position: &Position,
        current: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        let price = current.price_native;

        let liquidity_threshold = position.entry_liquidity_usd * (1.0 - self.liquidity_drop_fraction);
        if current.liquidity_usd < liquidity_threshold {
            return Some(ExitReason::LiquidityDrop {
                threshold_usd: liquidity_threshold,
            });
        }

        let stop_price = position.trailing_stop_price(self.trailing_stop_fraction);
        if price <= stop_price {
            return Some(ExitReason::TrailingStop { stop_price });
        }

        if price >= position.entry_price_native * self.take_profit_multiplier {
            return Some(ExitReason::TakeProfit);
        }

        if current.price_change.m5 < self.momentum_fade_floor
            && position.held_for(now) > self.min_dwell()
        {
            return Some(ExitReason::MomentumFade {
                floor: self.momentum_fade_floor,
            });
        }

        None
    }

    /// Whether the missing-data counter has reached the forced-exit limit
    pub fn data_exhausted(&self, missing_cycles: u32) -> bool {
        self.max_missing_cycles
            .is_some_and(|limit| missing_cycles >= limit)
    }
}

/// The single open paper position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub base_token: TokenRef,
    pub quote_token: TokenRef,
    pub pair_address: PairAddress,
    pub amount_token: f64,
    pub entry_price_native: f64,
    pub entry_time: DateTime<Utc>,
    #[serde(rename = "entryLiquidityUSD")]
    pub entry_liquidity_usd: f64,
    /// Highest native price seen since entry; never decreases
    pub peak_price_native: f64,
    pub last_price_native: f64,
    #[serde(default)]
    pub missing_cycles: u32,
}

impl Position {
    /// Open a position on `snapshot` holding `amount_token`
    pub fn open(snapshot: &MarketSnapshot, amount_token: f64, now: DateTime<Utc>) -> Self {
        Position {
            base_token: snapshot.base.clone(),
            quote_token: snapshot.quote.clone(),
            pair_address: snapshot.pair_address.clone(),
            amount_token,
            entry_price_native: snapshot.price_native,
            entry_time: now,
            entry_liquidity_usd: snapshot.liquidity_usd,
            peak_price_native: snapshot.price_native,
            last_price_native: snapshot.price_native,
            missing_cycles: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.base_token.symbol
    }

    /// Record a fresh observation of the held pair
    pub fn observe(&mut self, snapshot: &MarketSnapshot) {
        self.peak_price_native = self.peak_price_native.max(snapshot.price_native);
        self.last_price_native = snapshot.price_native;
        self.missing_cycles = 0;
    }

    /// Record a cycle without data for the held pair; returns the running count
    pub fn mark_missing(&mut self) -> u32 {
        self.missing_cycles += 1;
        self.missing_cycles
    }

    pub fn trailing_stop_price(&self, trailing_stop_fraction: f64) -> f64 {
        self.peak_price_native * (1.0 - trailing_stop_fraction)
    }

    pub fn held_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_snapshot(now: DateTime<Utc>) -> MarketSnapshot {
        MarketSnapshot::new("pair", "WIF", 1.0, now)
            .with_liquidity(10_000.0)
            .with_price_change(2.0, 5.0)
    }

    fn held(now: DateTime<Utc>) -> Position {
        Position::open(&entry_snapshot(now), 1.0, now)
    }

    #[test]
    fn test_peak_only_rises() {
        let now = Utc::now();
        let mut pos = held(now);

        pos.observe(&entry_snapshot(now).with_price_native(1.2));
        pos.observe(&entry_snapshot(now).with_price_native(1.1));

        assert_eq!(pos.peak_price_native, 1.2);
        assert_eq!(pos.last_price_native, 1.1);
    }

    #[test]
    fn test_trailing_stop_references_peak() {
        let now = Utc::now();
        // keep take profit out of reach
        let policy = ExitPolicy {
            take_profit_multiplier: 2.0,
            ..ExitPolicy::default()
        };
        let mut pos = held(now);
        pos.observe(&entry_snapshot(now).with_price_native(1.2));

        // 1.2 * 0.97 = 1.164
        let above = entry_snapshot(now).with_price_native(1.17);
        pos.observe(&above);
        assert!(policy.evaluate(&pos, &above, now).is_none());

        let at_stop = entry_snapshot(now).with_price_native(1.164);
        pos.observe(&at_stop);
        assert!(matches!(
            policy.evaluate(&pos, &at_stop, now),
            Some(ExitReason::TrailingStop { .. })
        ));
    }

    #[test]
    fn test_trailing_stop_wins_over_take_profit() {
        let now = Utc::now();
        let policy = ExitPolicy::default();
        let mut pos = held(now);
        pos.observe(&entry_snapshot(now).with_price_native(1.2));

        // 1.10 is above the 1.05 target and below the 1.164 stop
        let pullback = entry_snapshot(now).with_price_native(1.10);
        pos.observe(&pullback);
        assert!(matches!(
            policy.evaluate(&pos, &pullback, now),
            Some(ExitReason::TrailingStop { .. })
        ));
    }

    #[test]
    fn test_liquidity_drop_wins_over_take_profit() {
        let now = Utc::now();
        let policy = ExitPolicy::default();
        let mut pos = held(now);

        let snapshot = entry_snapshot(now)
            .with_price_native(1.10)
            .with_liquidity(6_000.0);
        pos.observe(&snapshot);

        assert_eq!(
            policy.evaluate(&pos, &snapshot, now),
            Some(ExitReason::LiquidityDrop {
                threshold_usd: 7_000.0
            })
        );
    }

    #[test]
    fn test_take_profit() {
        let now = Utc::now();
        let policy = ExitPolicy::default();
        let mut pos = held(now);

        let snapshot = entry_snapshot(now).with_price_native(1.05);
        pos.observe(&snapshot);
        assert_eq!(
            policy.evaluate(&pos, &snapshot, now),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_momentum_fade_waits_for_dwell() {
        let entered = Utc::now();
        let policy = ExitPolicy::default();
        let mut pos = held(entered);

        let faded = entry_snapshot(entered).with_price_change(-0.5, 1.0);
        pos.observe(&faded);

        let early = entered + Duration::minutes(4);
        assert!(policy.evaluate(&pos, &faded, early).is_none());

        let late = entered + Duration::minutes(6);
        assert!(matches!(
            policy.evaluate(&pos, &faded, late),
            Some(ExitReason::MomentumFade { .. })
        ));
    }

    #[test]
    fn test_missing_data_limit() {
        let policy = ExitPolicy::default();
        assert!(!policy.data_exhausted(1_000));

        let policy = ExitPolicy {
            max_missing_cycles: Some(3),
            ..ExitPolicy::default()
        };
        let mut pos = held(Utc::now());
        assert!(!policy.data_exhausted(pos.mark_missing()));
        assert!(!policy.data_exhausted(pos.mark_missing()));
        assert!(policy.data_exhausted(pos.mark_missing()));

        pos.observe(&entry_snapshot(Utc::now()));
        assert_eq!(pos.missing_cycles, 0);
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(ExitReason::TakeProfit.to_string(), "Take Profit");
        assert_eq!(
            ExitReason::LiquidityDrop {
                threshold_usd: 7_000.0
            }
            .to_string(),
            "Liquidity Drop (< 7000 USD)"
        );
    }
}
