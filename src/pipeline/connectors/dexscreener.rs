//! DexScreener API Integration
//!
//! DEX-aggregator connector providing:
//! - Token name and symbol
//! - Current price (USD), market cap, liquidity, 24h volume
//! - Price-change percentages (5m/1h/6h/24h)
//! - Post-migration pool address
//! - Social links
//!
//! ## API Reference
//!
//! Endpoint: https://api.dexscreener.com/token-pairs/v1/solana/{mint}
//! Returns: Array of trading pairs for the token

use super::{Connector, DexObservation, SourceGate};
use crate::pipeline::error::{TrackerError, TrackerResult};
use crate::pipeline::types::{PriceChange, SourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";

/// DexIds under which DexScreener lists pairs still on a launch-platform curve
const CURVE_DEX_IDS: &[&str] = &["pumpfun", "moonshot", "launchlab"];

/// DexScreener pair response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexScreenerPair {
    #[serde(rename = "dexId", default)]
    pub dex_id: String,
    #[serde(rename = "pairAddress", default)]
    pub pair_address: Option<String>,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: QuoteToken,
    #[serde(rename = "priceUsd", default)]
    pub price_usd: Option<String>,
    #[serde(rename = "marketCap", default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<PairLiquidity>,
    #[serde(default)]
    pub volume: Option<PairWindows>,
    #[serde(rename = "priceChange", default)]
    pub price_change: Option<PairWindows>,
    #[serde(rename = "pairCreatedAt", default)]
    pub pair_created_at: Option<i64>,
    #[serde(default)]
    pub info: Option<PairInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    #[serde(default)]
    pub address: Option<String>,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteToken {
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairLiquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairWindows {
    #[serde(default)]
    pub m5: Option<f64>,
    #[serde(default)]
    pub h1: Option<f64>,
    #[serde(default)]
    pub h6: Option<f64>,
    #[serde(default)]
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub websites: Vec<serde_json::Value>,
    #[serde(default)]
    pub socials: Vec<serde_json::Value>,
}

/// Pick the most relevant pair for `mint` and convert it
///
/// Pairs quoted in SOL are preferred; among those the deepest liquidity
/// wins. Pairs whose base token is a different mint are ignored.
pub fn observation_from_pairs(mint: &str, pairs: &[DexScreenerPair]) -> Option<DexObservation> {
    let liquidity = |p: &DexScreenerPair| p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);

    let pair = pairs
        .iter()
        .filter(|p| p.base_token.address.as_deref().map_or(true, |a| a == mint))
        .max_by(|a, b| {
            let a_sol = a.quote_token.symbol == "SOL";
            let b_sol = b.quote_token.symbol == "SOL";
            a_sol
                .cmp(&b_sol)
                .then(liquidity(a).total_cmp(&liquidity(b)))
        })?;

    let windows = pair.price_change.clone().unwrap_or_default();
    let is_curve_pair = CURVE_DEX_IDS.contains(&pair.dex_id.as_str());

    Some(DexObservation {
        symbol: Some(pair.base_token.symbol.clone()).filter(|s| !s.is_empty()),
        name: Some(pair.base_token.name.clone()).filter(|s| !s.is_empty()),
        price_usd: pair
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite()),
        market_cap_usd: pair.market_cap,
        liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
        volume_24h_usd: pair.volume.as_ref().and_then(|v| v.h24),
        price_change: PriceChange {
            m5: windows.m5,
            h1: windows.h1,
            h6: windows.h6,
            h24: windows.h24,
        },
        pool_address: if is_curve_pair { None } else { pair.pair_address.clone() },
        pair_created_at_raw: pair.pair_created_at,
        has_social_links: pair
            .info
            .as_ref()
            .map_or(false, |i| !i.socials.is_empty() || !i.websites.is_empty()),
    })
}

pub struct DexScreenerConnector {
    client: reqwest::Client,
    base_url: String,
    gate: SourceGate,
}

impl DexScreenerConnector {
    pub fn new(client: reqwest::Client, gate: SourceGate) -> Self {
        Self::with_base_url(client, gate, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, gate: SourceGate, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gate,
        }
    }

    async fn fetch_pairs(&self, mint: &str) -> TrackerResult<Vec<DexScreenerPair>> {
        let url = format!("{}/token-pairs/v1/solana/{}", self.base_url, mint);
        let kind = SourceKind::DexAggregator;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))?;

        if !response.status().is_success() {
            return Err(TrackerError::from_status(kind, response.status()));
        }

        response
            .json::<Vec<DexScreenerPair>>()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))
    }
}

#[async_trait]
impl Connector for DexScreenerConnector {
    type Output = DexObservation;

    fn kind(&self) -> SourceKind {
        SourceKind::DexAggregator
    }

    async fn fetch(&self, address: &str) -> TrackerResult<Option<DexObservation>> {
        let pairs = self.gate.call(|| self.fetch_pairs(address)).await?;
        Ok(observation_from_pairs(address, &pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn pairs_fixture() -> Vec<DexScreenerPair> {
        let json = serde_json::json!([
            {
                "chainId": "solana",
                "dexId": "pumpfun",
                "pairAddress": "CurvePair111",
                "baseToken": { "address": MINT, "name": "Popcat", "symbol": "POPCAT" },
                "quoteToken": { "address": "So11111111111111111111111111111111111111112", "symbol": "SOL" },
                "priceUsd": "0.0012",
                "liquidity": { "usd": 5000.0 },
                "volume": { "h24": 1200.0 },
                "priceChange": { "h1": 3.5 },
                "marketCap": 120000.0,
                "pairCreatedAt": 1700000000000i64
            },
            {
                "chainId": "solana",
                "dexId": "raydium",
                "pairAddress": "RaydiumPair111",
                "baseToken": { "address": MINT, "name": "Popcat", "symbol": "POPCAT" },
                "quoteToken": { "symbol": "SOL" },
                "priceUsd": "0.0013",
                "liquidity": { "usd": 85000.0 },
                "volume": { "h24": 250000.0, "h1": 9000.0 },
                "priceChange": { "m5": -1.0, "h1": 4.0, "h6": 12.5, "h24": 40.0 },
                "marketCap": 130000.0,
                "pairCreatedAt": 1700003600000i64,
                "info": { "socials": [ { "type": "twitter", "url": "https://x.com/popcat" } ] }
            },
            {
                "chainId": "solana",
                "dexId": "orca",
                "pairAddress": "UsdcPair111",
                "baseToken": { "address": MINT, "name": "Popcat", "symbol": "POPCAT" },
                "quoteToken": { "symbol": "USDC" },
                "priceUsd": "0.0013",
                "liquidity": { "usd": 900000.0 }
            }
        ]);
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_prefers_deepest_sol_pair() {
        let obs = observation_from_pairs(MINT, &pairs_fixture()).unwrap();

        assert_eq!(obs.symbol.as_deref(), Some("POPCAT"));
        assert_eq!(obs.liquidity_usd, Some(85000.0));
        assert_eq!(obs.volume_24h_usd, Some(250000.0));
        assert_eq!(obs.price_usd, Some(0.0013));
        assert_eq!(obs.price_change.h24, Some(40.0));
        assert_eq!(obs.pool_address.as_deref(), Some("RaydiumPair111"));
        assert_eq!(obs.pair_created_at_raw, Some(1700003600000));
        assert!(obs.has_social_links);
    }

    #[test]
    fn test_curve_pair_has_no_pool() {
        let pairs: Vec<DexScreenerPair> = pairs_fixture().into_iter().take(1).collect();
        let obs = observation_from_pairs(MINT, &pairs).unwrap();

        assert_eq!(obs.pool_address, None);
        assert_eq!(obs.market_cap_usd, Some(120000.0));
        assert!(!obs.has_social_links);
    }

    #[test]
    fn test_foreign_base_token_ignored() {
        let obs = observation_from_pairs("SomeOtherMint", &pairs_fixture());
        assert!(obs.is_none());
        assert!(observation_from_pairs(MINT, &[]).is_none());
    }

    #[test]
    fn test_garbage_price_is_unknown() {
        let mut pairs = pairs_fixture();
        pairs.truncate(1);
        pairs[0].price_usd = Some("NaN-ish".to_string());
        let obs = observation_from_pairs(MINT, &pairs).unwrap();
        assert_eq!(obs.price_usd, None);
    }

    #[tokio::test]
    #[ignore] // Run only when testing with live API
    async fn test_fetch_live() {
        let client = crate::pipeline::connectors::http_client(std::time::Duration::from_secs(10)).unwrap();
        let connector = DexScreenerConnector::new(client, SourceGate::unthrottled(SourceKind::DexAggregator));

        // USDC mint address (known to exist)
        let result = connector.fetch("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").await;
        assert!(result.unwrap().is_some());
    }
}
