//! Paper wallet accounting
//!
//! Fees, proceeds and realized P&L for simulated swaps, and the SOL wallet
//! they settle against. Every settlement returns the immutable trade record
//! describing it.
//!
//! ```text
//! BUY:  tokens = trade_size / price        wallet -= trade_size * (1 + fee_rate)
//! SELL: gross  = tokens * price            wallet += gross * (1 - fee_rate)
//!       pnl    = gross * (1 - fee_rate) - trade_size
//! ```
//!
//! The entry-side fee is deliberately left out of the P&L cost basis so that
//! realized P&L stays comparable across trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::TradeLogEntry;
use crate::{Action, PairAddress};

/// Fixed trade size and per-side fee rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub trade_size_sol: f64,
    pub fee_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            trade_size_sol: 1.0,
            fee_rate: 0.003,
        }
    }
}

impl FeeSchedule {
    /// Fee charged on the SOL committed to an entry swap
    pub fn entry_fee(&self) -> f64 {
        self.trade_size_sol * self.fee_rate
    }

    /// Total SOL debited on entry
    pub fn entry_cost(&self) -> f64 {
        self.trade_size_sol + self.entry_fee()
    }

    /// Price a BUY at `price_native`
    pub fn quote_buy(&self, price_native: f64) -> BuyFill {
        BuyFill {
            sol_amount: self.trade_size_sol,
            token_amount: self.trade_size_sol / price_native,
            price_native,
            fee_sol: self.entry_fee(),
        }
    }

    /// Price a SELL of `token_amount` at `price_native`
    pub fn quote_sell(&self, token_amount: f64, price_native: f64) -> SellFill {
        let gross_sol = token_amount * price_native;
        let fee_sol = gross_sol * self.fee_rate;
        let net_sol = gross_sol - fee_sol;
        SellFill {
            token_amount,
            price_native,
            gross_sol,
            fee_sol,
            net_sol,
            profit_loss_sol: net_sol - self.trade_size_sol,
        }
    }
}

/// Computed amounts of a simulated BUY
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyFill {
    /// Gross SOL committed to the swap (the fee is charged on top)
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price_native: f64,
    pub fee_sol: f64,
}

impl BuyFill {
    pub fn total_cost(&self) -> f64 {
        self.sol_amount + self.fee_sol
    }
}

/// Computed amounts of a simulated SELL
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellFill {
    pub token_amount: f64,
    pub price_native: f64,
    pub gross_sol: f64,
    pub fee_sol: f64,
    pub net_sol: f64,
    pub profit_loss_sol: f64,
}

/// SOL-denominated paper wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperWallet {
    pub sol_balance: f64,
    #[serde(default)]
    pub initial_sol: f64,
    pub trades_made: u32,
    pub profitable_trades: u32,
    pub total_fees_paid: f64,
}

/// Read-only view handed to the logging collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletSnapshot {
    pub sol_balance: f64,
    pub trades_made: u32,
    pub profitable_pct: f64,
    pub total_fees_paid: f64,
}

impl fmt::Display for WalletSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wallet: {:.4} SOL | trades {} ({:.1}% profitable) | fees {:.6} SOL",
            self.sol_balance, self.trades_made, self.profitable_pct, self.total_fees_paid
        )
    }
}

impl PaperWallet {
    pub fn new(starting_balance: f64) -> Self {
        PaperWallet {
            sol_balance: starting_balance,
            initial_sol: starting_balance,
            trades_made: 0,
            profitable_trades: 0,
            total_fees_paid: 0.0,
        }
    }

    pub fn can_afford(&self, amount: f64) -> bool {
        self.sol_balance >= amount
    }

    /// Share of closed trades with positive P&L, in percent
    pub fn profitable_pct(&self) -> f64 {
        if self.trades_made == 0 {
            return 0.0;
        }
        self.profitable_trades as f64 / self.trades_made as f64 * 100.0
    }

    /// Balance change relative to the starting balance, in percent.
    /// Excludes the value of any open position.
    pub fn total_return_pct(&self) -> f64 {
        if self.initial_sol == 0.0 {
            return 0.0;
        }
        (self.sol_balance - self.initial_sol) / self.initial_sol * 100.0
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            sol_balance: self.sol_balance,
            trades_made: self.trades_made,
            profitable_pct: self.profitable_pct(),
            total_fees_paid: self.total_fees_paid,
        }
    }

    /// Debit an executed BUY and return its trade record
    pub fn settle_buy(
        &mut self,
        fill: &BuyFill,
        symbol: &str,
        pair_address: &PairAddress,
        at: DateTime<Utc>,
    ) -> TradeLogEntry {
        self.sol_balance -= fill.total_cost();
        self.total_fees_paid += fill.fee_sol;

        TradeLogEntry {
            timestamp: at,
            action: Action::Buy,
            symbol: symbol.to_string(),
            pair_address: pair_address.clone(),
            sol_amount: fill.sol_amount,
            token_amount: fill.token_amount,
            price_native: fill.price_native,
            fee_sol: fill.fee_sol,
            profit_loss_sol: None,
            reason: None,
        }
    }

    /// Credit an executed SELL and return its trade record
    pub fn settle_sell(
        &mut self,
        fill: &SellFill,
        symbol: &str,
        pair_address: &PairAddress,
        reason: String,
        at: DateTime<Utc>,
    ) -> TradeLogEntry {
        self.sol_balance += fill.net_sol;
        self.total_fees_paid += fill.fee_sol;
        self.trades_made += 1;
        if fill.profit_loss_sol > 0.0 {
            self.profitable_trades += 1;
        }

        TradeLogEntry {
            timestamp: at,
            action: Action::Sell,
            symbol: symbol.to_string(),
            pair_address: pair_address.clone(),
            sol_amount: fill.gross_sol,
            token_amount: fill.token_amount,
            price_native: fill.price_native,
            fee_sol: fill.fee_sol,
            profit_loss_sol: Some(fill.profit_loss_sol),
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_buy_debits_trade_size_plus_fee() {
        let fees = FeeSchedule::default();
        let mut wallet = PaperWallet::new(10.0);
        let fill = fees.quote_buy(0.5);

        assert_relative_eq!(fill.token_amount, 2.0);
        assert_relative_eq!(fill.fee_sol, 0.003);

        let entry = wallet.settle_buy(&fill, "WIF", &PairAddress::new("p"), Utc::now());
        assert_relative_eq!(wallet.sol_balance, 8.997, epsilon = 1e-12);
        assert_relative_eq!(wallet.total_fees_paid, 0.003);
        assert_eq!(wallet.trades_made, 0);
        assert_eq!(entry.action, Action::Buy);
        assert_eq!(entry.sol_amount, 1.0);
        assert!(entry.profit_loss_sol.is_none());
    }

    #[test]
    fn test_sell_credits_net_proceeds() {
        let fees = FeeSchedule::default();
        let mut wallet = PaperWallet::new(8.997);
        let fill = fees.quote_sell(2.0, 0.6);

        assert_relative_eq!(fill.gross_sol, 1.2, epsilon = 1e-12);
        assert_relative_eq!(fill.net_sol, 1.2 * 0.997, epsilon = 1e-12);
        assert_relative_eq!(fill.profit_loss_sol, 1.2 * 0.997 - 1.0, epsilon = 1e-12);

        let entry = wallet.settle_sell(
            &fill,
            "WIF",
            &PairAddress::new("p"),
            "Take Profit".to_string(),
            Utc::now(),
        );
        assert_relative_eq!(wallet.sol_balance, 8.997 + 1.2 * 0.997, epsilon = 1e-12);
        assert_eq!(wallet.trades_made, 1);
        assert_eq!(wallet.profitable_trades, 1);
        assert_eq!(entry.reason.as_deref(), Some("Take Profit"));
        assert_eq!(entry.sol_amount, fill.gross_sol);
    }

    #[test]
    fn test_losing_sell_is_not_profitable() {
        let fees = FeeSchedule::default();
        let mut wallet = PaperWallet::new(9.0);
        // break-even gross still loses the exit fee
        let fill = fees.quote_sell(1.0, 1.0);
        assert!(fill.profit_loss_sol < 0.0);

        wallet.settle_sell(&fill, "X", &PairAddress::new("p"), "Stop".into(), Utc::now());
        assert_eq!(wallet.trades_made, 1);
        assert_eq!(wallet.profitable_trades, 0);
        assert_eq!(wallet.profitable_pct(), 0.0);
    }

    #[test]
    fn test_profitable_pct_and_return() {
        let mut wallet = PaperWallet::new(10.0);
        assert_eq!(wallet.profitable_pct(), 0.0);

        wallet.trades_made = 4;
        wallet.profitable_trades = 1;
        wallet.sol_balance = 11.0;
        assert_relative_eq!(wallet.profitable_pct(), 25.0);
        assert_relative_eq!(wallet.total_return_pct(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_snapshot_reports_counters() {
        let mut wallet = PaperWallet::new(10.0);
        wallet.trades_made = 2;
        wallet.profitable_trades = 1;
        wallet.total_fees_paid = 0.012;

        let snapshot = wallet.snapshot();
        assert_eq!(snapshot.trades_made, 2);
        assert_relative_eq!(snapshot.profitable_pct, 50.0);
        assert_eq!(
            snapshot.to_string(),
            "Wallet: 10.0000 SOL | trades 2 (50.0% profitable) | fees 0.012000 SOL"
        );
    }
}
