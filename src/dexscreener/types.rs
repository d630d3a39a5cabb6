//! Wire types for the DexScreener search endpoint and their conversion
//! into validated snapshots

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::{MarketSnapshot, PairAddress, SnapshotError, TokenRef, TxnCounts, Windowed};

/// Envelope returned by `/latest/dex/search`.
///
/// Pairs are kept as raw JSON so one malformed entry cannot fail the batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub pairs: Option<Vec<serde_json::Value>>,
}

/// Treat an explicit `null` like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DexToken {
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct DexTxns {
    #[serde(deserialize_with = "null_as_default")]
    pub m5: TxnCounts,
    #[serde(deserialize_with = "null_as_default")]
    pub h1: TxnCounts,
    #[serde(deserialize_with = "null_as_default")]
    pub h6: TxnCounts,
    #[serde(deserialize_with = "null_as_default")]
    pub h24: TxnCounts,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct DexWindows {
    #[serde(deserialize_with = "null_as_default")]
    pub m5: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub h1: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub h6: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub h24: f64,
}

impl From<DexWindows> for Windowed<f64> {
    fn from(w: DexWindows) -> Self {
        Windowed {
            m5: w.m5,
            h1: w.h1,
            h6: w.h6,
            h24: w.h24,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct DexLiquidity {
    #[serde(deserialize_with = "null_as_default")]
    pub usd: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub base: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub quote: f64,
}

/// One pair as the feed reports it. Missing or null numbers decode as zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DexPair {
    #[serde(deserialize_with = "null_as_default")]
    pub chain_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub dex_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub pair_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub base_token: DexToken,
    #[serde(deserialize_with = "null_as_default")]
    pub quote_token: DexToken,
    pub price_native: Option<String>,
    pub price_usd: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub txns: DexTxns,
    #[serde(deserialize_with = "null_as_default")]
    pub volume: DexWindows,
    #[serde(deserialize_with = "null_as_default")]
    pub price_change: DexWindows,
    pub liquidity: Option<DexLiquidity>,
    pub fdv: Option<f64>,
    /// Epoch milliseconds
    pub pair_created_at: Option<i64>,
}

impl MarketSnapshot {
    /// Validate a raw pair into a snapshot observed at `observed_at`
    pub fn try_from_pair(pair: DexPair, observed_at: DateTime<Utc>) -> Result<Self, SnapshotError> {
        if pair.pair_address.is_empty() {
            return Err(SnapshotError::MissingIdentifier {
                field: "pairAddress",
            });
        }
        if pair.base_token.address.is_empty() {
            return Err(SnapshotError::MissingIdentifier {
                field: "baseToken.address",
            });
        }
        if pair.quote_token.address.is_empty() {
            return Err(SnapshotError::MissingIdentifier {
                field: "quoteToken.address",
            });
        }

        let price_native = pair
            .price_native
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| SnapshotError::InvalidPrice {
                pair: pair.pair_address.clone(),
                raw: pair.price_native.clone(),
            })?;

        let price_usd = pair
            .price_usd
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .unwrap_or(0.0);

        let pair_created_at = pair
            .pair_created_at
            .filter(|ms| *ms > 0)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(MarketSnapshot {
            pair_address: PairAddress::new(pair.pair_address),
            dex_id: pair.dex_id,
            url: pair.url,
            base: TokenRef::new(pair.base_token.address, pair.base_token.symbol),
            quote: TokenRef::new(pair.quote_token.address, pair.quote_token.symbol),
            price_native,
            price_usd,
            liquidity_usd: pair.liquidity.map(|l| l.usd).unwrap_or(0.0),
            volume: pair.volume.into(),
            price_change: pair.price_change.into(),
            txns: Windowed {
                m5: pair.txns.m5,
                h1: pair.txns.h1,
                h6: pair.txns.h6,
                h24: pair.txns.h24,
            },
            pair_created_at,
            observed_at,
        })
    }
}

/// Convert a raw batch, dropping malformed pairs.
///
/// Returns the snapshots in feed order and the number dropped.
pub fn ingest_pairs(pairs: Vec<DexPair>, observed_at: DateTime<Utc>) -> (Vec<MarketSnapshot>, usize) {
    let mut dropped = 0;
    let snapshots = pairs
        .into_iter()
        .filter_map(|pair| match MarketSnapshot::try_from_pair(pair, observed_at) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!("Dropping pair: {}", e);
                dropped += 1;
                None
            }
        })
        .collect();
    (snapshots, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIR_JSON: &str = r#"{
        "chainId": "solana",
        "dexId": "raydium",
        "url": "https://dexscreener.com/solana/abc",
        "pairAddress": "abc",
        "baseToken": { "address": "wifmint", "name": "dogwifhat", "symbol": "WIF" },
        "quoteToken": { "address": "So11111111111111111111111111111111111111112", "name": "Wrapped SOL", "symbol": "SOL" },
        "priceNative": "0.01250",
        "priceUsd": "1.87",
        "txns": { "m5": { "buys": 30, "sells": 10 }, "h1": { "buys": 200, "sells": 150 } },
        "volume": { "m5": 1200.5, "h1": 9000, "h24": 250000 },
        "priceChange": { "m5": 2.5, "h1": -1.2 },
        "liquidity": { "usd": 45000, "base": 1000, "quote": 200 },
        "fdv": 1000000,
        "pairCreatedAt": 1700000000000
    }"#;

    fn pair() -> DexPair {
        serde_json::from_str(PAIR_JSON).unwrap()
    }

    #[test]
    fn test_decodes_full_pair() {
        let snap = MarketSnapshot::try_from_pair(pair(), Utc::now()).unwrap();
        assert_eq!(snap.pair_address.as_str(), "abc");
        assert_eq!(snap.base.symbol, "WIF");
        assert_eq!(snap.quote.symbol, "SOL");
        assert_eq!(snap.price_native, 0.0125);
        assert_eq!(snap.price_usd, 1.87);
        assert_eq!(snap.liquidity_usd, 45_000.0);
        assert_eq!(snap.volume.m5, 1200.5);
        assert_eq!(snap.volume.h6, 0.0);
        assert_eq!(snap.price_change.m5, 2.5);
        assert_eq!(snap.txns.m5, TxnCounts::new(30, 10));
        assert_eq!(snap.txns.h24, TxnCounts::default());
        assert_eq!(
            snap.pair_created_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let raw = r#"{
            "pairAddress": "p",
            "baseToken": { "address": "b", "symbol": "B" },
            "quoteToken": { "address": "q", "symbol": "SOL" },
            "priceNative": "0.5",
            "priceUsd": null
        }"#;
        let pair: DexPair = serde_json::from_str(raw).unwrap();
        let snap = MarketSnapshot::try_from_pair(pair, Utc::now()).unwrap();
        assert_eq!(snap.liquidity_usd, 0.0);
        assert_eq!(snap.price_usd, 0.0);
        assert!(snap.pair_created_at.is_none());
        assert_eq!(snap.m5_buy_sell_ratio(), 0.5);
    }

    #[test]
    fn test_rejects_bad_price() {
        for raw in [None, Some("abc"), Some("0"), Some("-1.5"), Some("NaN"), Some("inf")] {
            let mut p = pair();
            p.price_native = raw.map(str::to_string);
            assert!(
                matches!(
                    MarketSnapshot::try_from_pair(p, Utc::now()),
                    Err(SnapshotError::InvalidPrice { .. })
                ),
                "price {:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_rejects_missing_identifiers() {
        let mut p = pair();
        p.pair_address.clear();
        assert_eq!(
            MarketSnapshot::try_from_pair(p, Utc::now()).unwrap_err(),
            SnapshotError::MissingIdentifier {
                field: "pairAddress"
            }
        );

        let mut p = pair();
        p.quote_token.address.clear();
        assert!(MarketSnapshot::try_from_pair(p, Utc::now()).is_err());
    }

    #[test]
    fn test_ingest_counts_dropped() {
        let mut bad = pair();
        bad.price_native = Some("0".to_string());
        let (snaps, dropped) = ingest_pairs(vec![pair(), bad, pair()], Utc::now());
        assert_eq!(snaps.len(), 2);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_null_numbers_decode_as_zero() {
        let raw = r#"{
            "chainId": "solana",
            "pairAddress": "p",
            "baseToken": { "address": "b", "symbol": "B" },
            "quoteToken": { "address": "q", "symbol": "SOL" },
            "priceNative": "0.5",
            "txns": { "m5": null },
            "volume": { "m5": null, "h1": 10 },
            "priceChange": { "m5": null },
            "liquidity": { "usd": null }
        }"#;
        let pair: DexPair = serde_json::from_str(raw).unwrap();
        let snap = MarketSnapshot::try_from_pair(pair, Utc::now()).unwrap();
        assert_eq!(snap.price_change.m5, 0.0);
        assert_eq!(snap.volume.m5, 0.0);
        assert_eq!(snap.volume.h1, 10.0);
        assert_eq!(snap.liquidity_usd, 0.0);
        assert_eq!(snap.txns.m5, TxnCounts::default());
    }

    #[test]
    fn test_null_pairs_envelope() {
        let resp: SearchResponse =
            serde_json::from_str(r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        assert!(resp.pairs.is_none());
    }
}
