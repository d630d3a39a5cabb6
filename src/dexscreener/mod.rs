//! DexScreener market data feed
//!
//! Public search endpoint, no API key needed. Raw pairs are decoded here
//! and validated into [`MarketSnapshot`](crate::MarketSnapshot)s before
//! anything downstream sees them.

mod client;
mod error;
mod types;

pub use client::{decode_search_body, DexScreenerClient};
pub use error::{FeedError, FeedResult, MAX_ERROR_BODY_CHARS};
pub use types::*;
