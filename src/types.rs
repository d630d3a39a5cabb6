//! Core data types used across the scoring engine and the paper trader

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a raw pair is rejected at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("missing {field} identifier")]
    MissingIdentifier { field: &'static str },

    #[error("invalid native price {raw:?} for pair {pair}")]
    InvalidPrice { pair: String, raw: Option<String> },
}

/// On-chain pair (pool) address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairAddress(pub String);

impl PairAddress {
    pub fn new(s: impl Into<String>) -> Self {
        PairAddress(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PairAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token identity on one side of a pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: String,
    pub symbol: String,
}

impl TokenRef {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>) -> Self {
        TokenRef {
            address: address.into(),
            symbol: symbol.into(),
        }
    }
}

/// A value observed over the feed's rolling windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Windowed<T> {
    pub m5: T,
    pub h1: T,
    pub h6: T,
    pub h24: T,
}

/// Buy and sell transaction counts for one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxnCounts {
    pub buys: u32,
    pub sells: u32,
}

impl TxnCounts {
    pub fn new(buys: u32, sells: u32) -> Self {
        TxnCounts { buys, sells }
    }

    /// `buys / (buys + sells)`, or 0.5 when the window saw no transactions
    pub fn buy_ratio(&self) -> f64 {
        let total = self.buys as u64 + self.sells as u64;
        if total == 0 {
            return 0.5;
        }
        self.buys as f64 / total as f64
    }
}

/// Simulated trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
        }
    }
}

/// One observation of a pair, already parsed and validated.
///
/// `price_native` is always finite and positive; raw pairs that cannot
/// satisfy that never become a `MarketSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pair_address: PairAddress,
    pub dex_id: String,
    pub url: String,
    pub base: TokenRef,
    pub quote: TokenRef,
    pub price_native: f64,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume: Windowed<f64>,
    pub price_change: Windowed<f64>,
    pub txns: Windowed<TxnCounts>,
    pub pair_created_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Create a snapshot with zeroed metrics, quoted in SOL.
    ///
    /// Mostly useful for fixtures; the `with_*` setters fill in the rest.
    pub fn new(
        pair_address: impl Into<String>,
        base_symbol: impl Into<String>,
        price_native: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let base_symbol = base_symbol.into();
        MarketSnapshot {
            pair_address: PairAddress::new(pair_address),
            dex_id: String::new(),
            url: String::new(),
            base: TokenRef::new(format!("{}-mint", base_symbol), base_symbol),
            quote: TokenRef::new("So11111111111111111111111111111111111111112", "SOL"),
            price_native,
            price_usd: 0.0,
            liquidity_usd: 0.0,
            volume: Windowed::default(),
            price_change: Windowed::default(),
            txns: Windowed::default(),
            pair_created_at: None,
            observed_at,
        }
    }

    pub fn with_quote(mut self, quote: TokenRef) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_price_native(mut self, price: f64) -> Self {
        self.price_native = price;
        self
    }

    pub fn with_liquidity(mut self, liquidity_usd: f64) -> Self {
        self.liquidity_usd = liquidity_usd;
        self
    }

    pub fn with_volume_m5(mut self, volume: f64) -> Self {
        self.volume.m5 = volume;
        self
    }

    pub fn with_price_change(mut self, m5: f64, h1: f64) -> Self {
        self.price_change.m5 = m5;
        self.price_change.h1 = h1;
        self
    }

    pub fn with_m5_txns(mut self, buys: u32, sells: u32) -> Self {
        self.txns.m5 = TxnCounts::new(buys, sells);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.pair_created_at = Some(created_at);
        self
    }

    /// 5-minute buy/sell transaction ratio
    pub fn m5_buy_sell_ratio(&self) -> f64 {
        self.txns.m5.buy_ratio()
    }

    /// Age of the pair at `now`, if the creation time is known
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.pair_created_at.map(|created| now - created)
    }
}
