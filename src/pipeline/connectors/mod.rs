//! Source connectors
//!
//! Each connector talks to one external API and converts its response into
//! a fixed observation shape. Field names of the upstream JSON never leave
//! the adapter module; the aggregator only sees the types defined here.
//!
//! | Source            | Adapter          | Observation               |
//! |-------------------|------------------|---------------------------|
//! | pump.fun          | `pumpfun`        | `LaunchObservation`       |
//! | DexScreener       | `dexscreener`    | `DexObservation`          |
//! | rugcheck.xyz      | `rugcheck`       | `RiskObservation`         |
//! | Jupiter quote API | `jupiter`        | `ProbeObservation`        |
//! | Helius            | `helius`         | `Vec<BalanceLeg>`         |

pub mod dexscreener;
pub mod helius;
pub mod jupiter;
pub mod pumpfun;
pub mod rugcheck;

use super::error::{TrackerError, TrackerResult};
use super::rate_limit::SourceRateLimiter;
use super::retry::RetryPolicy;
use super::types::{HolderDistribution, PriceChange, SourceKind};
use async_trait::async_trait;
use std::future::Future;

/// Launch-platform (bonding curve) view of a token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchObservation {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub market_cap_usd: Option<f64>,
    /// Raw epoch value, unit unknown
    pub created_timestamp_raw: Option<i64>,
    pub last_trade_timestamp_raw: Option<i64>,
    /// Bonding curve reserve threshold reached
    pub curve_complete: bool,
    /// Curve withdrawn, cancelled or banned by the platform
    pub withdrawn: bool,
    /// Pool the curve migrated into, when the platform knows it
    pub pool_address: Option<String>,
    pub has_social_links: bool,
}

/// DEX-aggregator view of a token's most relevant pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DexObservation {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub price_change: PriceChange,
    /// Pair address on a post-migration DEX (None while the pair lives on the curve)
    pub pool_address: Option<String>,
    pub pair_created_at_raw: Option<i64>,
    pub has_social_links: bool,
}

/// Risk-scanner verdict
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskObservation {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    /// Safety verdict 0-100, higher = safer
    pub safety_score: Option<f64>,
    pub rugged: Option<bool>,
    pub mint_authority_revoked: Option<bool>,
    pub freeze_authority_revoked: Option<bool>,
    pub lp_locked_pct: Option<f64>,
    pub holder_count: Option<u64>,
    pub distribution: HolderDistribution,
    pub total_liquidity_usd: Option<f64>,
    /// Total supply in UI units
    pub supply: Option<f64>,
}

/// Swap-routing probe result
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeObservation {
    pub routable: bool,
    pub price_impact_pct: Option<f64>,
}

/// One account's balance delta inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceLeg {
    pub signature: String,
    pub wallet: String,
    /// None for a pure SOL leg
    pub token_mint: Option<String>,
    /// Signed token delta in UI units
    pub token_amount: f64,
    /// Signed SOL delta
    pub sol_amount: f64,
    pub block_time_raw: i64,
    /// Wallet paid the transaction fee, i.e. signed it
    pub fee_payer: bool,
}

/// Latest responses of all per-token sources for one enrichment cycle
///
/// `None` means the source did not answer this cycle (error, timeout, or
/// nothing known about the address). Failed sources are listed in
/// `failures` for logging.
#[derive(Debug, Clone, Default)]
pub struct ConnectorResponses {
    pub launch: Option<LaunchObservation>,
    pub dex: Option<DexObservation>,
    pub risk: Option<RiskObservation>,
    pub probe: Option<ProbeObservation>,
    pub failures: Vec<SourceKind>,
}

impl ConnectorResponses {
    /// At least one source answered this cycle
    pub fn any_answered(&self) -> bool {
        self.launch.is_some() || self.dex.is_some() || self.risk.is_some() || self.probe.is_some()
    }
}

/// A data source queried per token address
#[async_trait]
pub trait Connector: Send + Sync {
    type Output: Send;

    fn kind(&self) -> SourceKind;

    /// Fetch the source's view of `address`
    ///
    /// `Ok(None)` means the source answered but knows nothing about the
    /// address, which is different from a failure.
    async fn fetch(&self, address: &str) -> TrackerResult<Option<Self::Output>>;
}

/// Rate limiter plus retry policy shared by every call to one source
pub struct SourceGate {
    kind: SourceKind,
    limiter: SourceRateLimiter,
    retry: RetryPolicy,
}

impl SourceGate {
    pub fn new(kind: SourceKind, limiter: SourceRateLimiter, retry: RetryPolicy) -> Self {
        Self { kind, limiter, retry }
    }

    /// Gate with no limits and a single attempt
    pub fn unthrottled(kind: SourceKind) -> Self {
        Self::new(kind, SourceRateLimiter::unlimited(), RetryPolicy::none())
    }

    /// Run `op` under the rate limiter, retrying transient failures
    pub async fn call<T, F, Fut>(&self, mut op: F) -> TrackerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TrackerResult<T>>,
    {
        let mut backoff = self.retry.backoff();
        loop {
            self.limiter.acquire().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    log::debug!("⚠️  {} call failed (attempt {}): {}", self.kind, backoff.attempts_made(), e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build the shared HTTP client for connectors
pub fn http_client(timeout: std::time::Duration) -> TrackerResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("launchtrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TrackerError::Config(format!("HTTP client: {}", e)))
}

/// Parse a number that may arrive as JSON number or string
pub(crate) fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
