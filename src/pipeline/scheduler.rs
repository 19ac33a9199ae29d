//! Background tasks
//!
//! - polling: discovery plus one enrichment cycle per tracked address,
//!   bounded by the worker count
//! - snapshots: scheduled captures on the configured cadence
//! - retention: pruning of history past the retention window
//!
//! Each task runs until cancelled and never returns an error; failures are
//! logged and retried on the next tick.

use super::connectors::pumpfun::LaunchDiscovery;
use super::engine::{CycleOutcome, TrackerEngine};
use super::error::TrackerError;
use super::timestamp::{now_millis, now_seconds};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Counters for one polling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub discovered: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Enrich newly launched tokens and every pollable tracked token once
pub async fn polling_pass(
    engine: &TrackerEngine,
    discovery: Option<&dyn LaunchDiscovery>,
    discovery_limit: usize,
    worker_count: usize,
) -> PassStats {
    let mut addresses: BTreeSet<String> = engine.table().pollable_addresses().into_iter().collect();

    let mut discovered = 0;
    if let Some(discovery) = discovery {
        match discovery.discover(discovery_limit).await {
            Ok(found) => {
                for address in found {
                    if !engine.table().contains(&address) && addresses.insert(address) {
                        discovered += 1;
                    }
                }
            }
            Err(e) => log::warn!("⚠️  Discovery failed: {}", e),
        }
    }

    let updated = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    stream::iter(addresses)
        .for_each_concurrent(worker_count.max(1), |address| {
            let (updated, skipped, failed) = (&updated, &skipped, &failed);
            async move {
                match engine.enrich(&address).await {
                    Ok(CycleOutcome::Updated { .. }) => {
                        updated.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(CycleOutcome::InFlight | CycleOutcome::NoData) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrackerError::InvalidAddress(a)) => {
                        log::debug!("Ignoring invalid address {}", a);
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::error!("❌ Enrichment of {} failed: {}", address, e);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    PassStats {
        discovered,
        updated: updated.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
    }
}

pub async fn polling_task(
    engine: Arc<TrackerEngine>,
    discovery: Option<Arc<dyn LaunchDiscovery>>,
    poll_interval: Duration,
    discovery_limit: usize,
    worker_count: usize,
) {
    log::info!("⏰ Starting polling task (interval: {}ms)", poll_interval.as_millis());

    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;
        let stats = polling_pass(&engine, discovery.as_deref(), discovery_limit, worker_count).await;
        log::info!(
            "🔄 Pass done: {} updated, {} skipped, {} failed ({} new, {} tracked)",
            stats.updated,
            stats.skipped,
            stats.failed,
            stats.discovered,
            engine.table().len()
        );
    }
}

pub async fn snapshot_task(engine: Arc<TrackerEngine>, check_interval: Duration) {
    log::info!("📸 Starting snapshot scheduler (check every {}s)", check_interval.as_secs());

    let mut timer = interval(check_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;
        let captured = engine
            .snapshots()
            .run_scheduled(engine.table(), now_millis())
            .await;
        if captured > 0 {
            log::debug!("📸 {} scheduled snapshots written", captured);
        }
    }
}

pub async fn retention_task(engine: Arc<TrackerEngine>, prune_interval: Duration) {
    log::info!("🧹 Starting retention task (interval: {}s)", prune_interval.as_secs());

    let mut timer = interval(prune_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;
        if let Err(e) = engine.snapshots().prune(now_seconds()).await {
            log::error!("❌ Snapshot pruning failed: {}", e);
        }
    }
}
