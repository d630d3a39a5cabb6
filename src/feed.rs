//! Market data collaborator and upstream failure guard
//!
//! The engine never talks HTTP itself; it is handed whatever batch a
//! [`MarketFeed`] produced for the cycle. [`FeedGuard`] sits in front of the
//! feed and stops hammering it after repeated failures:
//!
//! - Healthy: every cycle fetches
//! - Tripped: cycles are skipped until the cool-down elapses
//! - Probing: one fetch is let through; success heals, failure re-trips

use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::dexscreener::FeedResult;
use crate::MarketSnapshot;

/// Validated snapshots for one cycle
#[derive(Debug, Clone, Default)]
pub struct SnapshotBatch {
    pub snapshots: Vec<MarketSnapshot>,
    /// Raw pairs rejected at the ingestion boundary
    pub dropped: usize,
}

impl SnapshotBatch {
    pub fn new(snapshots: Vec<MarketSnapshot>) -> Self {
        SnapshotBatch {
            snapshots,
            dropped: 0,
        }
    }
}

/// Source of one snapshot batch per cycle
#[allow(async_fn_in_trait)]
pub trait MarketFeed {
    async fn fetch_snapshots(&self) -> FeedResult<SnapshotBatch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    Healthy,
    Tripped,
    Probing,
}

/// Consecutive-failure breaker for the upstream feed
#[derive(Debug)]
pub struct FeedGuard {
    state: GuardState,
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    tripped_at: Option<Instant>,
}

impl FeedGuard {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        FeedGuard {
            state: GuardState::Healthy,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            tripped_at: None,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether this cycle may call the feed
    pub fn allow_fetch(&mut self) -> bool {
        match self.state {
            GuardState::Healthy | GuardState::Probing => true,
            GuardState::Tripped => {
                let cooled = self
                    .tripped_at
                    .map_or(true, |at| at.elapsed() >= self.cooldown);
                if cooled {
                    info!("Feed cool-down elapsed, probing");
                    self.state = GuardState::Probing;
                }
                cooled
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != GuardState::Healthy {
            info!(
                "Feed recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.state = GuardState::Healthy;
        self.consecutive_failures = 0;
        self.tripped_at = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        match self.state {
            GuardState::Healthy => {
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(
                        "Feed failed {} times in a row, pausing for {:?}",
                        self.consecutive_failures, self.cooldown
                    );
                    self.trip();
                }
            }
            GuardState::Probing => {
                warn!("Feed probe failed, pausing again");
                self.trip();
            }
            GuardState::Tripped => {}
        }
    }

    fn trip(&mut self) {
        self.state = GuardState::Tripped;
        self.tripped_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_after_threshold() {
        let mut guard = FeedGuard::new(3, Duration::from_secs(60));
        assert!(guard.allow_fetch());

        guard.record_failure();
        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Healthy);

        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Tripped);
        assert!(!guard.allow_fetch());
    }

    #[test]
    fn test_success_resets_count() {
        let mut guard = FeedGuard::new(3, Duration::from_secs(60));
        guard.record_failure();
        guard.record_failure();
        guard.record_success();
        assert_eq!(guard.consecutive_failures(), 0);

        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Healthy);
    }

    #[test]
    fn test_probe_after_cooldown() {
        let mut guard = FeedGuard::new(1, Duration::from_millis(1));
        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Tripped);

        std::thread::sleep(Duration::from_millis(5));
        assert!(guard.allow_fetch());
        assert_eq!(guard.state(), GuardState::Probing);

        // failed probe trips immediately
        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Tripped);

        std::thread::sleep(Duration::from_millis(5));
        assert!(guard.allow_fetch());
        guard.record_success();
        assert_eq!(guard.state(), GuardState::Healthy);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut guard = FeedGuard::new(0, Duration::from_secs(1));
        assert!(guard.allow_fetch());
        guard.record_failure();
        assert_eq!(guard.state(), GuardState::Tripped);
    }
}
