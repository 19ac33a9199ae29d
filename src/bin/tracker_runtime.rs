//! Tracker Runtime
//!
//! Orchestrates the launch token tracker:
//! - Opens the SQLite store and runs schema migrations
//! - Wires the source connectors behind their rate limiters
//! - Spawns polling, snapshot and retention tasks
//! - Shuts down on CTRL+C
//!
//! Usage:
//!   cargo run --release --bin tracker_runtime
//!
//! Configuration is read from the environment (see `TrackerConfig::from_env`),
//! a `.env` file is honoured. Log level via RUST_LOG (default: info).

use anyhow::Context;
use dotenv::dotenv;
use launchtrack::pipeline::{
    config::SourceLimits,
    connectors::{
        dexscreener::DexScreenerConnector, helius::HeliusConnector, http_client, jupiter::JupiterConnector,
        pumpfun::{LaunchDiscovery, PumpFunConnector}, rugcheck::RugCheckConnector, SourceGate,
    },
    db::{SqliteTokenStore, TokenStore},
    engine::{SourceSet, TrackerEngine},
    rate_limit::SourceRateLimiter,
    retry::RetryPolicy,
    scheduler::{polling_task, retention_task, snapshot_task},
    table::TokenTable,
    types::SourceKind,
    TrackerConfig,
};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

fn gate(kind: SourceKind, limits: &SourceLimits) -> SourceGate {
    SourceGate::new(
        kind,
        SourceRateLimiter::from_limits(limits),
        RetryPolicy::from_limits(limits),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Launch Token Tracker");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TrackerConfig::from_env();

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Poll interval: {}ms", config.poll_interval_ms);
    info!("   ├─ Workers: {}", config.worker_count);
    info!("   ├─ Cycle timeout: {}ms", config.cycle_timeout_ms);
    info!("   ├─ Significant change: {}%", config.significant_change_pct);
    info!("   ├─ Snapshot interval: {}s", config.snapshot_interval.as_secs());
    info!("   ├─ Snapshot retention: {}d", config.snapshot_retention.as_secs() / 86_400);
    info!("   ├─ Unreachable after: {}d", config.unreachable_after.as_secs() / 86_400);
    info!(
        "   └─ Balance feed: {}",
        if config.helius_api_key.is_some() { "enabled" } else { "disabled (HELIUS_API_KEY unset)" }
    );

    info!("🔧 Initializing database...");
    let store = SqliteTokenStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path))?;
    let store: Arc<dyn TokenStore> = Arc::new(store);

    let tokens = store.load_tokens().await.context("loading tracked tokens")?;
    let table = Arc::new(TokenTable::from_tokens(tokens));
    info!("✅ Database initialized ({} tracked tokens)", table.len());

    let client = http_client(Duration::from_millis(config.cycle_timeout_ms)).context("building HTTP client")?;

    let pumpfun = Arc::new(PumpFunConnector::new(
        client.clone(),
        gate(SourceKind::LaunchPlatform, &config.pumpfun),
    ));
    let sources = SourceSet {
        launch: Some(pumpfun.clone()),
        dex: Some(Arc::new(DexScreenerConnector::new(
            client.clone(),
            gate(SourceKind::DexAggregator, &config.dexscreener),
        ))),
        risk: Some(Arc::new(RugCheckConnector::new(
            client.clone(),
            gate(SourceKind::RiskScanner, &config.rugcheck),
        ))),
        probe: Some(Arc::new(JupiterConnector::new(
            client.clone(),
            gate(SourceKind::LiquidityProbe, &config.jupiter),
        ))),
        balances: match &config.helius_api_key {
            Some(key) => Some(Arc::new(HeliusConnector::new(
                client.clone(),
                gate(SourceKind::BalanceFeed, &config.helius),
                key,
            ))),
            None => None,
        },
    };

    let engine = Arc::new(TrackerEngine::new(&config, sources, store, table));
    let discovery: Arc<dyn LaunchDiscovery> = pumpfun;

    info!("🚀 Spawning background tasks...");
    let polling = tokio::spawn(polling_task(
        engine.clone(),
        Some(discovery),
        config.poll_interval(),
        config.discovery_limit,
        config.worker_count,
    ));
    info!("   ├─ ✅ Polling task spawned");

    let check_every = config.snapshot_interval.min(Duration::from_secs(60));
    let snapshots = tokio::spawn(snapshot_task(engine.clone(), check_every));
    info!("   ├─ ✅ Snapshot scheduler spawned");

    let retention = tokio::spawn(retention_task(engine.clone(), Duration::from_secs(3600)));
    info!("   └─ ✅ Retention task spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    polling.abort();
    snapshots.abort();
    retention.abort();

    let unknown = engine.unknown_status_count();
    if unknown > 0 {
        info!("   └─ {} tokens classified unknown this run", unknown);
    }
    info!("✅ Tracker runtime stopped");
    Ok(())
}
