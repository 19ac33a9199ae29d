//! pump.fun launch-platform connector
//!
//! Bonding-curve state of a coin plus recent-launch discovery.
//!
//! Endpoints:
//! - `GET /coins/{mint}` single coin
//! - `GET /coins?sort=created_timestamp&order=DESC&limit=N` newest launches

use super::{Connector, LaunchObservation, SourceGate};
use crate::pipeline::error::{TrackerError, TrackerResult};
use crate::pipeline::types::SourceKind;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://frontend-api-v3.pump.fun";

#[derive(Debug, Clone, Deserialize)]
pub struct PumpFunCoin {
    pub mint: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub last_trade_timestamp: Option<i64>,
    #[serde(default)]
    pub complete: bool,
    #[serde(default, alias = "banned")]
    pub is_banned: bool,
    #[serde(default)]
    pub raydium_pool: Option<String>,
    #[serde(default)]
    pub pump_swap_pool: Option<String>,
    #[serde(default, alias = "market_cap_usd")]
    pub usd_market_cap: Option<f64>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PumpFunCoin {
    pub fn into_observation(self) -> LaunchObservation {
        let has_social_links = [&self.twitter, &self.telegram, &self.website]
            .iter()
            .any(|link| non_empty(link).is_some());

        LaunchObservation {
            symbol: non_empty(&self.symbol),
            name: non_empty(&self.name),
            // Every pump.fun mint is created with 6 decimals
            decimals: Some(6),
            market_cap_usd: self.usd_market_cap.filter(|v| v.is_finite()),
            created_timestamp_raw: self.created_timestamp,
            last_trade_timestamp_raw: self.last_trade_timestamp,
            curve_complete: self.complete,
            withdrawn: self.is_banned,
            pool_address: non_empty(&self.pump_swap_pool).or_else(|| non_empty(&self.raydium_pool)),
            has_social_links,
        }
    }
}

pub struct PumpFunConnector {
    client: reqwest::Client,
    base_url: String,
    gate: SourceGate,
}

impl PumpFunConnector {
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

    async fn fetch_coin(&self, mint: &str) -> TrackerResult<Option<PumpFunCoin>> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        let kind = SourceKind::LaunchPlatform;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TrackerError::from_status(kind, response.status()));
        }

        response
            .json::<Option<PumpFunCoin>>()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))
    }

    async fn fetch_latest(&self, limit: usize) -> TrackerResult<Vec<PumpFunCoin>> {
        let url = format!(
            "{}/coins?offset=0&limit={}&sort=created_timestamp&order=DESC&includeNsfw=false",
            self.base_url, limit
        );
        let kind = SourceKind::LaunchPlatform;

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
            .json::<Vec<PumpFunCoin>>()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))
    }

    /// Mint addresses of the newest launches
    pub async fn discover_recent(&self, limit: usize) -> TrackerResult<Vec<String>> {
        let coins = self.gate.call(|| self.fetch_latest(limit)).await?;
        Ok(coins.into_iter().map(|c| c.mint).collect())
    }
}

#[async_trait]
impl Connector for PumpFunConnector {
    type Output = LaunchObservation;

    fn kind(&self) -> SourceKind {
        SourceKind::LaunchPlatform
    }

    async fn fetch(&self, address: &str) -> TrackerResult<Option<LaunchObservation>> {
        let coin = self.gate.call(|| self.fetch_coin(address)).await?;
        Ok(coin.map(PumpFunCoin::into_observation))
    }
}

/// Discovery of newly launched tokens
#[async_trait]
pub trait LaunchDiscovery: Send + Sync {
    async fn discover(&self, limit: usize) -> TrackerResult<Vec<String>>;
}

#[async_trait]
impl LaunchDiscovery for PumpFunConnector {
    async fn discover(&self, limit: usize) -> TrackerResult<Vec<String>> {
        self.discover_recent(limit).await
    }
}
