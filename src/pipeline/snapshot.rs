//! Snapshot store
//!
//! Sole writer of `tokens_hist`. Rows are keyed by (address, timestamp) and
//! never rewritten: a capture colliding with an existing key is dropped and
//! reported as not inserted. Retention pruning is the only delete.

use super::db::TokenStore;
use super::error::TrackerResult;
use super::table::TokenTable;
use super::timestamp::window;
use super::types::{SnapshotReason, Token, TokenSnapshot, TokenStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct SnapshotStore {
    store: Arc<dyn TokenStore>,
    interval: Duration,
    retention: Duration,
    /// Last scheduled capture per address
    last_scheduled: DashMap<String, DateTime<Utc>>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn TokenStore>, interval: Duration, retention: Duration) -> Self {
        Self {
            store,
            interval,
            retention,
            last_scheduled: DashMap::new(),
        }
    }

    /// Write one snapshot of `token` taken at `at`
    ///
    /// Returns `false` when a snapshot with the same key already exists.
    pub async fn capture(&self, token: &Token, reason: SnapshotReason, at: DateTime<Utc>) -> TrackerResult<bool> {
        let snapshot = TokenSnapshot {
            token: token.clone(),
            snapshot_timestamp: at,
            snapshot_reason: reason,
        };
        let inserted = self.store.insert_snapshot(&snapshot).await?;
        if inserted {
            log::debug!("📸 {} snapshot of {} at {}", reason.as_str(), token.address, at);
        } else {
            log::debug!("Snapshot of {} at {} already exists", token.address, at);
        }
        Ok(inserted)
    }

    /// Whether a scheduled capture is due for `address`
    pub fn is_due(&self, address: &str, now: DateTime<Utc>) -> bool {
        match self.last_scheduled.get(address) {
            Some(last) => now - *last >= window(self.interval),
            None => true,
        }
    }

    /// Capture every non-archived token whose cadence has elapsed
    ///
    /// Archived tokens lose their cadence entry.
    /// A storage failure skips that token; it stays due for the next run.
    pub async fn run_scheduled(&self, table: &TokenTable, now: DateTime<Utc>) -> usize {
        let mut captured = 0;
        for token in table.all() {
            if token.status == TokenStatus::Archived {
                self.last_scheduled.remove(&token.address);
                continue;
            }
            if !self.is_due(&token.address, now) {
                continue;
            }
            match self.capture(&token, SnapshotReason::Scheduled, now).await {
                Ok(inserted) => {
                    self.last_scheduled.insert(token.address.clone(), now);
                    if inserted {
                        captured += 1;
                    }
                }
                Err(e) => log::error!("❌ Scheduled snapshot of {} failed: {}", token.address, e),
            }
        }
        captured
    }

    /// Manual capture of the current record; `Ok(None)` for an untracked address
    pub async fn capture_manual(
        &self,
        table: &TokenTable,
        address: &str,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<bool>> {
        match table.get(address) {
            Some(token) => self.capture(&token, SnapshotReason::Manual, now).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn history(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TrackerResult<Vec<TokenSnapshot>> {
        self.store.snapshot_history(address, from, to).await
    }

    /// Delete history older than the retention window
    pub async fn prune(&self, now: DateTime<Utc>) -> TrackerResult<usize> {
        let cutoff = now - window(self.retention);
        let removed = self.store.prune_snapshots(cutoff).await?;
        if removed > 0 {
            log::info!("🧹 Pruned {} snapshots older than {}", removed, cutoff);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::db::SqliteTokenStore;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()
    }

    fn setup() -> (NamedTempFile, Arc<dyn TokenStore>) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteTokenStore::open(file.path().to_str().unwrap()).unwrap();
        (file, Arc::new(store))
    }

    fn snapshots(store: &Arc<dyn TokenStore>) -> SnapshotStore {
        SnapshotStore::new(
            Arc::clone(store),
            Duration::from_secs(3600),
            Duration::from_secs(7 * 24 * 3600),
        )
    }

    #[tokio::test]
    async fn test_capture_never_rewrites() {
        let (_file, store) = setup();
        let snaps = snapshots(&store);
        let mut token = Token::new("mint-a", now());

        assert!(snaps.capture(&token, SnapshotReason::Manual, now()).await.unwrap());
        token.invest_score = 99.0;
        assert!(!snaps.capture(&token, SnapshotReason::Manual, now()).await.unwrap());

        let history = snaps.history("mint-a", now(), now()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].token.invest_score, 0.0);
    }

    #[tokio::test]
    async fn test_scheduled_cadence() {
        let (_file, store) = setup();
        let snaps = snapshots(&store);
        let mut archived = Token::new("mint-old", now());
        archived.status = TokenStatus::Archived;
        let table = TokenTable::from_tokens([Token::new("mint-a", now()), archived]);

        assert_eq!(snaps.run_scheduled(&table, now()).await, 1);
        assert_eq!(snaps.run_scheduled(&table, now() + chrono::Duration::minutes(30)).await, 0);
        assert_eq!(snaps.run_scheduled(&table, now() + chrono::Duration::minutes(60)).await, 1);

        let history = snaps
            .history("mint-a", now(), now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|s| s.snapshot_reason == SnapshotReason::Scheduled));
    }

    #[tokio::test]
    async fn test_archived_token_leaves_cadence() {
        let (_file, store) = setup();
        let snaps = snapshots(&store);
        let table = TokenTable::from_tokens([Token::new("mint-a", now())]);

        assert_eq!(snaps.run_scheduled(&table, now()).await, 1);
        assert_eq!(snaps.last_scheduled.len(), 1);

        let mut archived = Token::new("mint-a", now());
        archived.status = TokenStatus::Archived;
        table.publish(archived);

        assert_eq!(snaps.run_scheduled(&table, now() + chrono::Duration::hours(2)).await, 0);
        assert!(snaps.last_scheduled.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_and_significant_keys_distinct() {
        let (_file, store) = setup();
        let snaps = snapshots(&store);
        let token = Token::new("mint-a", now());
        let table = TokenTable::from_tokens([token.clone()]);

        let at = now() + chrono::Duration::milliseconds(1_250);
        assert_eq!(snaps.run_scheduled(&table, at).await, 1);
        let later = at + chrono::Duration::milliseconds(1);
        assert!(snaps.capture(&token, SnapshotReason::SignificantChange, later).await.unwrap());

        let history = snaps.history("mint-a", now(), now() + chrono::Duration::seconds(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].snapshot_timestamp, at);
    }

    #[tokio::test]
    async fn test_manual_and_prune() {
        let (_file, store) = setup();
        let snaps = snapshots(&store);
        let table = TokenTable::from_tokens([Token::new("mint-a", now())]);

        assert_eq!(snaps.capture_manual(&table, "mint-a", now()).await.unwrap(), Some(true));
        assert_eq!(snaps.capture_manual(&table, "mint-x", now()).await.unwrap(), None);

        assert_eq!(snaps.prune(now() + chrono::Duration::days(3)).await.unwrap(), 0);
        assert_eq!(snaps.prune(now() + chrono::Duration::days(8)).await.unwrap(), 1);
    }
}
