//! Tracker engine - one enrichment cycle per address
//!
//! ```text
//! connectors (concurrent, shared deadline)
//!     ↓
//! whale detector → balance_change_events
//!     ↓
//! EnrichmentAggregator::merge / reevaluate
//!     ↓
//! tokens (SQLite) → TokenTable → significant-change snapshot
//! ```
//!
//! At most one cycle runs per address: a second request while one is in
//! flight is skipped, not queued. Connector failures and timeouts only drop
//! that source for the cycle. A storage failure aborts the cycle for this
//! address and surfaces as `Err` to the polling pass; the next pass retries.

use super::aggregator::{AggregatorConfig, EnrichmentAggregator, MergeContext};
use super::config::TrackerConfig;
use super::connectors::{
    BalanceLeg, Connector, ConnectorResponses, DexObservation, LaunchObservation, ProbeObservation,
    RiskObservation,
};
use super::db::TokenStore;
use super::error::{TrackerError, TrackerResult};
use super::query::EventFilter;
use super::scoring::ScoringEngine;
use super::snapshot::SnapshotStore;
use super::status::StatusClassifier;
use super::table::TokenTable;
use super::timestamp::{now_millis, now_seconds, window};
use super::types::{SnapshotReason, SourceKind, Token, WhaleFlag};
use super::whale::WhaleDetector;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use solana_pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Connectors wired into the engine; `None` disables a source
#[derive(Clone, Default)]
pub struct SourceSet {
    pub launch: Option<Arc<dyn Connector<Output = LaunchObservation>>>,
    pub dex: Option<Arc<dyn Connector<Output = DexObservation>>>,
    pub risk: Option<Arc<dyn Connector<Output = RiskObservation>>>,
    pub probe: Option<Arc<dyn Connector<Output = ProbeObservation>>>,
    pub balances: Option<Arc<dyn Connector<Output = Vec<BalanceLeg>>>>,
}

/// Result of one `enrich` call
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle for the address was already running
    InFlight,
    /// Untracked address and no source knew it
    NoData,
    Updated {
        changed: bool,
        significant: bool,
    },
}

/// Solana addresses are base58-encoded 32-byte public keys
pub fn validate_address(address: &str) -> TrackerResult<()> {
    Pubkey::from_str(address)
        .map(|_| ())
        .map_err(|_| TrackerError::InvalidAddress(address.to_string()))
}

/// Removes the address from the in-flight set when the cycle ends
struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    address: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.address);
    }
}

pub struct TrackerEngine {
    sources: SourceSet,
    store: Arc<dyn TokenStore>,
    table: Arc<TokenTable>,
    snapshots: Arc<SnapshotStore>,
    aggregator: EnrichmentAggregator,
    whales: WhaleDetector,
    in_flight: DashSet<String>,
    cycle_timeout: Duration,
}

impl TrackerEngine {
    pub fn new(
        config: &TrackerConfig,
        sources: SourceSet,
        store: Arc<dyn TokenStore>,
        table: Arc<TokenTable>,
    ) -> Self {
        let aggregator = EnrichmentAggregator::new(
            AggregatorConfig {
                significant_change_pct: config.significant_change_pct,
                unreachable_after: config.unreachable_after,
            },
            ScoringEngine::new(config.scoring.clone()),
            StatusClassifier::new(config.status.clone()),
        );
        let snapshots = Arc::new(SnapshotStore::new(
            Arc::clone(&store),
            config.snapshot_interval,
            config.snapshot_retention,
        ));

        Self {
            sources,
            store,
            table,
            snapshots,
            aggregator,
            whales: WhaleDetector::new(config.whale.clone()),
            in_flight: DashSet::new(),
            cycle_timeout: config.cycle_timeout(),
        }
    }

    pub fn table(&self) -> &Arc<TokenTable> {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    /// Number of `unknown` status classifications since startup
    pub fn unknown_status_count(&self) -> u64 {
        self.aggregator.classifier().unknown_count()
    }

    /// Run one enrichment cycle for `address`
    pub async fn enrich(&self, address: &str) -> TrackerResult<CycleOutcome> {
        validate_address(address)?;

        if !self.in_flight.insert(address.to_string()) {
            log::debug!("⏭️  {} already in flight, skipping", address);
            return Ok(CycleOutcome::InFlight);
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            address: address.to_string(),
        };

        let deadline = Instant::now() + self.cycle_timeout;
        let mut failures = Vec::new();
        let (launch, dex, risk, probe, legs) = tokio::join!(
            fetch_before(self.sources.launch.as_ref(), address, deadline),
            fetch_before(self.sources.dex.as_ref(), address, deadline),
            fetch_before(self.sources.risk.as_ref(), address, deadline),
            fetch_before(self.sources.probe.as_ref(), address, deadline),
            fetch_before(self.sources.balances.as_ref(), address, deadline),
        );
        let legs = settle(legs, &mut failures);
        let responses = ConnectorResponses {
            launch: settle(launch, &mut failures),
            dex: settle(dex, &mut failures),
            risk: settle(risk, &mut failures),
            probe: settle(probe, &mut failures),
            failures,
        };

        let now = now_seconds();
        let previous = self.table.get(address);

        let blacklisted = self.store.is_blocked(address, now).await?;
        let supply = responses
            .risk
            .as_ref()
            .and_then(|r| r.supply)
            .or_else(|| previous.as_ref().and_then(|p| p.total_supply));
        let whale_flags = match legs {
            Some(legs) => Some(self.process_balances(address, &legs, supply, now).await?),
            None => None,
        };

        let ctx = MergeContext {
            now,
            blacklisted,
            whale_flags,
        };
        let outcome = if responses.any_answered() {
            self.aggregator.merge(address, previous.as_deref(), &responses, &ctx)
        } else if let Some(prev) = previous.as_deref() {
            self.aggregator.reevaluate(prev, &ctx)
        } else {
            log::debug!("🔍 {}: no source answered, not tracking yet", address);
            return Ok(CycleOutcome::NoData);
        };

        if !responses.failures.is_empty() {
            let names: Vec<&str> = responses.failures.iter().map(SourceKind::as_str).collect();
            log::debug!("   └─ {} merged without {}", address, names.join(", "));
        }

        if responses.any_answered() || outcome.changed {
            self.store.upsert_token(&outcome.token).await?;
        }
        let token = self.table.publish(outcome.token);

        if outcome.significant {
            self.snapshot_significant(&token).await;
        }
        if outcome.changed {
            log_token(&token);
        }

        Ok(CycleOutcome::Updated {
            changed: outcome.changed,
            significant: outcome.significant,
        })
    }

    /// Detect, persist and summarise whale activity for one cycle
    async fn process_balances(
        &self,
        address: &str,
        legs: &[BalanceLeg],
        supply: Option<f64>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Vec<WhaleFlag>> {
        let events = self.whales.detect(address, legs, supply);
        let stats = self.whales.record(self.store.as_ref(), &events).await?;
        if stats.inserted > 0 {
            log::debug!(
                "🐋 {}: {} new balance changes ({} already stored)",
                address,
                stats.inserted,
                stats.duplicates
            );
        }

        let recent = self
            .store
            .balance_events(&EventFilter {
                token_mint: Some(address.to_string()),
                large_only: true,
                since: Some(now - window(self.whales.summary_window())),
                until: None,
                limit: None,
            })
            .await?;
        Ok(self.whales.summarize(&recent, now))
    }

    async fn snapshot_significant(&self, token: &Token) {
        if let Err(e) = self
            .snapshots
            .capture(token, SnapshotReason::SignificantChange, now_millis())
            .await
        {
            log::error!("❌ Significant-change snapshot of {} failed: {}", token.address, e);
        }
    }
}

/// Fetch from an optional connector, giving up at `deadline`
async fn fetch_before<T: Send + 'static>(
    connector: Option<&Arc<dyn Connector<Output = T>>>,
    address: &str,
    deadline: Instant,
) -> Option<(SourceKind, Result<TrackerResult<Option<T>>, tokio::time::error::Elapsed>)> {
    let connector = connector?;
    let result = timeout_at(deadline, connector.fetch(address)).await;
    Some((connector.kind(), result))
}

/// Keep an answer, or record why the source dropped out of this cycle
fn settle<T>(
    fetched: Option<(SourceKind, Result<TrackerResult<Option<T>>, tokio::time::error::Elapsed>)>,
    failures: &mut Vec<SourceKind>,
) -> Option<T> {
    let (kind, result) = fetched?;
    match result {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            log::warn!("⚠️  {} failed: {}", kind, e);
            failures.push(kind);
            None
        }
        Err(_) => {
            log::warn!("⏱️  {} timed out, merging partial results", kind);
            failures.push(kind);
            None
        }
    }
}

fn log_token(token: &Token) {
    log::info!("📊 {} ({})", token.address, token.symbol.as_deref().unwrap_or("?"));
    log::info!("   ├─ Curve: {} | Status: {}", token.bonding_curve_status, token.status);
    log::info!(
        "   ├─ Liquidity: {} | Volume 24h: {}",
        token.liquidity_usd.map_or("unknown".to_string(), |l| format!("${:.0}", l)),
        token.volume_24h_usd.map_or("unknown".to_string(), |v| format!("${:.0}", v))
    );
    log::info!(
        "   └─ Invest: {:.1} | Rug: {:.1} | Risk-adjusted: {:.1}",
        token.invest_score,
        token.rug_score,
        token.risk_adjusted_score()
    );
}
