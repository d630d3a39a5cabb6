//! Position state machine
//!
//! One call to [`Engine::decide_cycle`] is one decision point: filter and
//! score the batch, then either manage the open position (Held) or try to
//! open one (Idle). At most one transition happens per cycle, so a position
//! closed in this cycle can only be replaced in the next one.
//!
//! The engine owns no state. Everything it mutates lives in the
//! [`TradingState`] handed to it, which keeps cycles deterministic and
//! testable without a timer.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::eligibility::EligibilityFilter;
use crate::ledger::{Checkpoint, HoldingSnapshot, TradeLogEntry, WalletLogEntry};
use crate::position::{ExitPolicy, ExitReason, Position};
use crate::ranker::{rank, Ranking};
use crate::scoring::{score_batch, ScoringWeights};
use crate::wallet::{FeeSchedule, PaperWallet};
use crate::MarketSnapshot;

// =============================================================================
// State
// =============================================================================

/// Wallet plus the optional open position, carried across cycles
#[derive(Debug, Clone, PartialEq)]
pub struct TradingState {
    pub wallet: PaperWallet,
    pub position: Option<Position>,
    pub cycle_count: u64,
}

impl TradingState {
    pub fn new(starting_balance: f64) -> Self {
        TradingState {
            wallet: PaperWallet::new(starting_balance),
            position: None,
            cycle_count: 0,
        }
    }

    pub fn from_checkpoint(ckpt: Checkpoint) -> Self {
        TradingState {
            wallet: ckpt.wallet,
            position: ckpt.position,
            cycle_count: ckpt.cycle_count,
        }
    }

    pub fn checkpoint(&self, now: DateTime<Utc>, config_hash: &str) -> Checkpoint {
        Checkpoint {
            timestamp: now,
            cycle_count: self.cycle_count,
            wallet: self.wallet.clone(),
            position: self.position.clone(),
            config_hash: config_hash.to_string(),
        }
    }

    pub fn is_holding(&self) -> bool {
        self.position.is_some()
    }

    /// Log the wallet and build its ledger record
    pub fn wallet_log_entry(&self, now: DateTime<Utc>) -> WalletLogEntry {
        let snapshot = self.wallet.snapshot();
        info!("{} | holding: {}", snapshot, self.is_holding());

        WalletLogEntry {
            timestamp: now,
            sol_balance: snapshot.sol_balance,
            holding: HoldingSnapshot::of(self.position.as_ref()),
            trades_made: snapshot.trades_made,
            fees_paid: snapshot.total_fees_paid,
        }
    }
}

// =============================================================================
// Cycle outcome
// =============================================================================

/// What the state machine did this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Idle -> Held
    Entered { symbol: String, score: f64 },
    /// Held -> Idle
    Exited { reason: ExitReason },
    /// Held, data present, no trigger fired
    Holding,
    /// Held, pair absent from the batch
    HeldDataMissing { missing_cycles: u32 },
    NoCandidates,
    BelowThreshold { symbol: String, score: f64 },
    InsufficientFunds { required: f64, available: f64 },
}

/// Result of reviewing the held pair
enum Review {
    Keep(Decision),
    Exit {
        reason: ExitReason,
        price_native: f64,
    },
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub decision: Decision,
    /// Trade record, present only on a transition
    pub trade: Option<TradeLogEntry>,
    /// Wallet record, present only when the wallet changed
    pub wallet: Option<WalletLogEntry>,
    pub ranking: Ranking,
    /// Snapshots that passed the eligibility filter
    pub eligible: usize,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct Engine {
    fees: FeeSchedule,
    filter: EligibilityFilter,
    weights: ScoringWeights,
    entry_threshold: f64,
    exit: ExitPolicy,
    top_scorers: usize,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Engine {
            fees: config.trading.fees(),
            filter: config.filters.clone(),
            weights: config.scoring.weights,
            entry_threshold: config.scoring.entry_threshold,
            exit: config.exit.clone(),
            top_scorers: config.scoring.top_scorers,
        }
    }

    /// Filter, score and rank a batch without touching any state
    pub fn rank_batch(&self, batch: &[MarketSnapshot], now: DateTime<Utc>) -> Ranking {
        let eligible = self.filter.apply(batch, now);
        rank(score_batch(eligible, &self.weights))
    }

    /// Run one decision cycle against `batch`
    pub fn decide_cycle(
        &self,
        state: &mut TradingState,
        batch: &[MarketSnapshot],
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        state.cycle_count += 1;

        let ranking = self.rank_batch(batch, now);
        let eligible = ranking.len();
        debug!(
            "Cycle {}: {} snapshots, {} eligible",
            state.cycle_count,
            batch.len(),
            eligible
        );
        if !ranking.is_empty() && self.top_scorers > 0 {
            info!("Top {} candidates:", self.top_scorers.min(eligible));
            for line in ranking.report(self.top_scorers) {
                info!("{}", line);
            }
        }

        let (decision, trade) = match state.position.as_mut() {
            Some(position) => match self.review_position(position, batch, now) {
                Review::Keep(decision) => (decision, None),
                Review::Exit {
                    reason,
                    price_native,
                } => {
                    let trade = self.close_position(state, price_native, &reason, now);
                    (Decision::Exited { reason }, trade)
                }
            },
            None => self.try_enter(state, &ranking, now),
        };

        let wallet = trade.as_ref().map(|_| state.wallet_log_entry(now));

        CycleOutcome {
            decision,
            trade,
            wallet,
            ranking,
            eligible,
        }
    }

    fn review_position(
        &self,
        position: &mut Position,
        batch: &[MarketSnapshot],
        now: DateTime<Utc>,
    ) -> Review {
        // Look up the held pair in the unfiltered batch: a pair that no
        // longer passes the entry filters must still be able to exit.
        let current = batch
            .iter()
            .find(|s| s.pair_address == position.pair_address);

        match current {
            Some(snapshot) => {
                position.observe(snapshot);
                match self.exit.evaluate(position, snapshot, now) {
                    Some(reason) => Review::Exit {
                        reason,
                        price_native: snapshot.price_native,
                    },
                    None => {
                        debug!(
                            "Holding {}: price={:.8}, peak={:.8}, liq={:.0}",
                            position.symbol(),
                            snapshot.price_native,
                            position.peak_price_native,
                            snapshot.liquidity_usd
                        );
                        Review::Keep(Decision::Holding)
                    }
                }
            }
            None => {
                let missing_cycles = position.mark_missing();
                warn!(
                    "No data for held {} ({}) this cycle ({} in a row)",
                    position.symbol(),
                    position.pair_address,
                    missing_cycles
                );
                if self.exit.data_exhausted(missing_cycles) {
                    Review::Exit {
                        reason: ExitReason::DataUnavailable { missing_cycles },
                        price_native: position.last_price_native,
                    }
                } else {
                    Review::Keep(Decision::HeldDataMissing { missing_cycles })
                }
            }
        }
    }

    fn close_position(
        &self,
        state: &mut TradingState,
        price_native: f64,
        reason: &ExitReason,
        now: DateTime<Utc>,
    ) -> Option<TradeLogEntry> {
        let position = state.position.take()?;
        let fill = self.fees.quote_sell(position.amount_token, price_native);
        let entry = state.wallet.settle_sell(
            &fill,
            position.symbol(),
            &position.pair_address,
            reason.to_string(),
            now,
        );

        info!(
            "SELL {} | {} tokens @ {:.8} SOL | gross {:.4} fee {:.4} P&L {:+.4} SOL | {}",
            position.symbol(),
            fill.token_amount,
            fill.price_native,
            fill.gross_sol,
            fill.fee_sol,
            fill.profit_loss_sol,
            reason
        );
        Some(entry)
    }

    fn try_enter(
        &self,
        state: &mut TradingState,
        ranking: &Ranking,
        now: DateTime<Utc>,
    ) -> (Decision, Option<TradeLogEntry>) {
        let Some(top) = ranking.top() else {
            debug!("No eligible candidates");
            return (Decision::NoCandidates, None);
        };

        if top.score < self.entry_threshold {
            debug!(
                "Top candidate {} scored {:.4}, below threshold {:.2}",
                top.symbol(),
                top.score,
                self.entry_threshold
            );
            return (
                Decision::BelowThreshold {
                    symbol: top.symbol().to_string(),
                    score: top.score,
                },
                None,
            );
        }

        let required = self.fees.entry_cost();
        if !state.wallet.can_afford(required) {
            warn!(
                "Insufficient balance to enter {}: need {:.4} SOL, have {:.4} SOL",
                top.symbol(),
                required,
                state.wallet.sol_balance
            );
            return (
                Decision::InsufficientFunds {
                    required,
                    available: state.wallet.sol_balance,
                },
                None,
            );
        }

        let snapshot = &top.snapshot;
        let fill = self.fees.quote_buy(snapshot.price_native);
        let entry = state
            .wallet
            .settle_buy(&fill, &snapshot.base.symbol, &snapshot.pair_address, now);
        state.position = Some(Position::open(snapshot, fill.token_amount, now));

        info!(
            "BUY {} | score {:.4} | {:.4} tokens @ {:.8} SOL | fee {:.4} SOL | liq {:.0} USD",
            snapshot.base.symbol,
            top.score,
            fill.token_amount,
            fill.price_native,
            fill.fee_sol,
            snapshot.liquidity_usd
        );

        (
            Decision::Entered {
                symbol: snapshot.base.symbol.clone(),
                score: top.score,
            },
            Some(entry),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn snap(pair: &str, price: f64, m5: f64, liquidity: f64, now: DateTime<Utc>) -> MarketSnapshot {
        MarketSnapshot::new(pair, pair.to_uppercase(), price, now)
            .with_price_change(m5, 1.0)
            .with_liquidity(liquidity)
            .with_volume_m5(1_000.0)
            .with_m5_txns(10, 10)
            .with_created_at(now - Duration::hours(5))
    }

    /// `hot` dominates every dimension and scores 1.0
    fn batch(now: DateTime<Utc>) -> Vec<MarketSnapshot> {
        vec![
            snap("cold", 0.5, -1.0, 3_000.0, now),
            snap("hot", 1.0, 8.0, 9_000.0, now)
                .with_volume_m5(5_000.0)
                .with_m5_txns(30, 5)
                .with_price_change(8.0, 10.0),
        ]
    }

    fn engine() -> Engine {
        Engine::new(&Config::default())
    }

    #[test]
    fn test_enters_top_candidate() {
        let now = Utc::now();
        let mut state = TradingState::new(10.0);

        let outcome = engine().decide_cycle(&mut state, &batch(now), now);

        assert!(matches!(outcome.decision, Decision::Entered { ref symbol, .. } if symbol == "HOT"));
        assert_eq!(outcome.eligible, 2);
        let trade = outcome.trade.unwrap();
        assert_eq!(trade.action, Action::Buy);
        assert_relative_eq!(state.wallet.sol_balance, 8.997, epsilon = 1e-12);

        let pos = state.position.as_ref().unwrap();
        assert_eq!(pos.pair_address.as_str(), "hot");
        assert_relative_eq!(pos.amount_token, 1.0);
        assert_eq!(pos.entry_liquidity_usd, 9_000.0);
        assert!(outcome.wallet.unwrap().holding.active);
        assert_eq!(state.cycle_count, 1);
    }

    #[test]
    fn test_below_threshold_does_not_enter() {
        let now = Utc::now();
        let mut state = TradingState::new(10.0);
        // single candidate cannot be normalized
        let outcome = engine().decide_cycle(&mut state, &batch(now)[1..], now);

        assert!(matches!(outcome.decision, Decision::BelowThreshold { score, .. } if score == 0.0));
        assert!(outcome.trade.is_none());
        assert!(outcome.wallet.is_none());
        assert!(!state.is_holding());
    }

    #[test]
    fn test_insufficient_funds_is_soft() {
        let now = Utc::now();
        let mut state = TradingState::new(1.002);
        let outcome = engine().decide_cycle(&mut state, &batch(now), now);

        assert_eq!(
            outcome.decision,
            Decision::InsufficientFunds {
                required: 1.003,
                available: 1.002
            }
        );
        assert_eq!(state.wallet.sol_balance, 1.002);
        assert!(!state.is_holding());
    }

    #[test]
    fn test_empty_batch() {
        let now = Utc::now();
        let mut state = TradingState::new(10.0);
        let outcome = engine().decide_cycle(&mut state, &[], now);
        assert_eq!(outcome.decision, Decision::NoCandidates);
    }

    #[test]
    fn test_exit_then_wait_a_cycle() {
        let now = Utc::now();
        let engine = engine();
        let mut state = TradingState::new(10.0);
        engine.decide_cycle(&mut state, &batch(now), now);

        let mut next = batch(now);
        next[1].price_native = 1.06;
        let outcome = engine.decide_cycle(&mut state, &next, now);
        assert_eq!(
            outcome.decision,
            Decision::Exited {
                reason: ExitReason::TakeProfit
            }
        );
        let trade = outcome.trade.unwrap();
        assert_eq!(trade.action, Action::Sell);
        assert_eq!(trade.reason.as_deref(), Some("Take Profit"));
        assert!(!state.is_holding());
        assert_eq!(state.wallet.trades_made, 1);

        // candidates still qualify, but re-entry waits for the next cycle
        let outcome = engine.decide_cycle(&mut state, &next, now);
        assert!(matches!(outcome.decision, Decision::Entered { .. }));
    }

    #[test]
    fn test_wallet_record_on_each_transition() {
        let now = Utc::now();
        let engine = engine();
        let mut state = TradingState::new(10.0);

        let bought = engine.decide_cycle(&mut state, &batch(now), now).wallet.unwrap();
        assert_relative_eq!(bought.sol_balance, 8.997, epsilon = 1e-12);
        assert_eq!(bought.trades_made, 0);
        assert_relative_eq!(bought.fees_paid, 0.003, epsilon = 1e-12);

        let mut next = batch(now);
        next[1].price_native = 1.06;
        let sold = engine.decide_cycle(&mut state, &next, now).wallet.unwrap();
        assert_eq!(sold.trades_made, 1);
        assert!(!sold.holding.active);
        assert_relative_eq!(sold.fees_paid, 0.003 + 1.06 * 0.003, epsilon = 1e-12);
        assert_eq!(state.wallet.snapshot().profitable_pct, 100.0);
    }

    #[test]
    fn test_held_with_empty_batch_reports_missing_data() {
        let now = Utc::now();
        let engine = engine();
        let mut state = TradingState::new(10.0);
        engine.decide_cycle(&mut state, &batch(now), now);

        let outcome = engine.decide_cycle(&mut state, &[], now);
        assert_eq!(
            outcome.decision,
            Decision::HeldDataMissing { missing_cycles: 1 }
        );
        assert!(outcome.wallet.is_none());
    }

    #[test]
    fn test_held_pair_found_even_when_ineligible() {
        let now = Utc::now();
        let engine = engine();
        let mut state = TradingState::new(10.0);
        engine.decide_cycle(&mut state, &batch(now), now);

        // liquidity now below both the filter minimum and 70% of entry
        let mut next = batch(now);
        next[1].liquidity_usd = 1_500.0;
        let outcome = engine.decide_cycle(&mut state, &next, now);
        assert!(matches!(
            outcome.decision,
            Decision::Exited {
                reason: ExitReason::LiquidityDrop { .. }
            }
        ));
    }

    #[test]
    fn test_missing_data_retains_position() {
        let now = Utc::now();
        let engine = engine();
        let mut state = TradingState::new(10.0);
        engine.decide_cycle(&mut state, &batch(now), now);
        let before = state.wallet.clone();

        let others = vec![batch(now)[0].clone()];
        for expected in 1..=3 {
            let outcome = engine.decide_cycle(&mut state, &others, now);
            assert_eq!(
                outcome.decision,
                Decision::HeldDataMissing {
                    missing_cycles: expected
                }
            );
            assert!(outcome.trade.is_none());
        }
        assert!(state.is_holding());
        assert_eq!(state.wallet, before);
    }

    #[test]
    fn test_forced_exit_after_missing_cycles() {
        let now = Utc::now();
        let mut config = Config::default();
        config.exit.max_missing_cycles = Some(2);
        let engine = Engine::new(&config);
        let mut state = TradingState::new(10.0);
        engine.decide_cycle(&mut state, &batch(now), now);

        let mut higher = batch(now);
        higher[1].price_native = 1.02;
        engine.decide_cycle(&mut state, &higher, now);

        let outcome = engine.decide_cycle(&mut state, &[], now);
        assert!(matches!(outcome.decision, Decision::HeldDataMissing { .. }));

        let outcome = engine.decide_cycle(&mut state, &[], now);
        assert_eq!(
            outcome.decision,
            Decision::Exited {
                reason: ExitReason::DataUnavailable { missing_cycles: 2 }
            }
        );
        // sold at the last observed price
        assert_eq!(outcome.trade.unwrap().price_native, 1.02);
    }

    #[test]
    fn test_checkpoint_restores_state() {
        let now = Utc::now();
        let mut state = TradingState::new(10.0);
        engine().decide_cycle(&mut state, &batch(now), now);

        let restored = TradingState::from_checkpoint(state.checkpoint(now, "cfg"));
        assert_eq!(restored, state);
    }
}
