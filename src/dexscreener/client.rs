//! HTTP client for the DexScreener pair search endpoint
//!
//! No API key required.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::error::{FeedError, FeedResult};
use super::types::{ingest_pairs, DexPair, SearchResponse};
use crate::config::FeedConfig;
use crate::feed::{MarketFeed, SnapshotBatch};

/// DexScreener API client
#[derive(Debug, Clone)]
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    chain_id: String,
    query: String,
}

impl DexScreenerClient {
    pub fn new(config: &FeedConfig) -> FeedResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(DexScreenerClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            query: config.query.clone(),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/latest/dex/search", self.base_url)
    }

    /// Search pairs matching `query`, keeping only the configured chain.
    ///
    /// Also returns how many entries could not be decoded at all.
    pub async fn search_pairs(&self, query: &str) -> FeedResult<(Vec<DexPair>, usize)> {
        let url = self.search_url();
        debug!("Fetching pairs: url={}, q={}", url, query);

        let response = self.http.get(&url).query(&[("q", query)]).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::status(status.as_u16(), &body));
        }

        let body = response.bytes().await?;
        let (pairs, undecodable) = decode_search_body(&body)?;
        let total = pairs.len();

        let pairs: Vec<DexPair> = pairs
            .into_iter()
            .filter(|p| p.chain_id == self.chain_id)
            .collect();

        debug!(
            "Fetched {} pairs, {} on {}, {} undecodable",
            total,
            pairs.len(),
            self.chain_id,
            undecodable
        );
        Ok((pairs, undecodable))
    }
}

impl MarketFeed for DexScreenerClient {
    async fn fetch_snapshots(&self) -> FeedResult<SnapshotBatch> {
        let (pairs, undecodable) = self.search_pairs(&self.query).await?;
        let (snapshots, dropped) = ingest_pairs(pairs, Utc::now());
        Ok(SnapshotBatch {
            snapshots,
            dropped: dropped + undecodable,
        })
    }
}

/// Decode a search response body into pairs plus the number of entries
/// that failed to decode.
///
/// An empty body or a `null` pairs array yields no pairs. Some endpoints
/// answer with a bare array instead of the envelope; that form is accepted
/// too. Entries are decoded one at a time, so a malformed pair is counted
/// and skipped instead of failing the batch.
pub fn decode_search_body(body: &[u8]) -> FeedResult<(Vec<DexPair>, usize)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok((Vec::new(), 0));
    }

    let entries = match serde_json::from_slice::<SearchResponse>(body) {
        Ok(envelope) => envelope.pairs.unwrap_or_default(),
        Err(envelope_err) => match serde_json::from_slice::<Vec<serde_json::Value>>(body) {
            Ok(entries) => entries,
            Err(_) => return Err(FeedError::Decode(envelope_err)),
        },
    };

    let mut undecodable = 0;
    let pairs = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<DexPair>(entry) {
            Ok(pair) => Some(pair),
            Err(e) => {
                debug!("Skipping undecodable pair: {}", e);
                undecodable += 1;
                None
            }
        })
        .collect();
    Ok((pairs, undecodable))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope() {
        let body = br#"{"schemaVersion":"1.0.0","pairs":[{"chainId":"solana","pairAddress":"a"},{"chainId":"base","pairAddress":"b"}]}"#;
        let (pairs, undecodable) = decode_search_body(body).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(undecodable, 0);
        assert_eq!(pairs[1].chain_id, "base");
    }

    #[test]
    fn test_decode_bare_array() {
        let body = br#"[{"chainId":"solana","pairAddress":"a"}]"#;
        let (pairs, _) = decode_search_body(body).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].pair_address, "a");
    }

    #[test]
    fn test_decode_empty_and_null() {
        assert!(decode_search_body(b"").unwrap().0.is_empty());
        assert!(decode_search_body(b"  \n").unwrap().0.is_empty());
        assert!(decode_search_body(br#"{"pairs":null}"#).unwrap().0.is_empty());
    }

    #[test]
    fn test_null_field_keeps_rest_of_batch() {
        let body = br#"{"pairs":[
            {"chainId":"solana","pairAddress":"a","priceChange":{"m5":1.5}},
            {"chainId":"solana","pairAddress":"b","priceChange":{"m5":null},"volume":{"h1":null}}
        ]}"#;
        let (pairs, undecodable) = decode_search_body(body).unwrap();
        assert_eq!(undecodable, 0);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].price_change.m5, 1.5);
        assert_eq!(pairs[1].price_change.m5, 0.0);
    }

    #[test]
    fn test_malformed_entry_is_counted_not_fatal() {
        let body = br#"{"pairs":[
            {"chainId":"solana","pairAddress":"a"},
            {"chainId":"solana","pairAddress":"b","volume":{"m5":"lots"}},
            42
        ]}"#;
        let (pairs, undecodable) = decode_search_body(body).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].pair_address, "a");
        assert_eq!(undecodable, 2);
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(
            decode_search_body(b"<html>busy</html>"),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn test_search_url_trims_slash() {
        let config = FeedConfig {
            base_url: "https://api.dexscreener.com/".to_string(),
            ..FeedConfig::default()
        };
        let client = DexScreenerClient::new(&config).unwrap();
        assert_eq!(
            client.search_url(),
            "https://api.dexscreener.com/latest/dex/search"
        );
    }
}
