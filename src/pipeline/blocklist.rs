//! Token blacklist
//!
//! SQL reference: `/sql/04_token_blacklist.sql`
//!
//! Query logic:
//! ```sql
//! SELECT address FROM token_blacklist
//! WHERE address = ? AND (expires_at IS NULL OR expires_at > ?)
//! ```
//!
//! Expiration handling:
//! - `expires_at = NULL`: permanently blacklisted
//! - `expires_at > now`: blacklisted until the entry lapses
//! - `expires_at <= now`: entry has lapsed, the token classifies normally

use super::error::TrackerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub address: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BlacklistEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }
}

/// Override input of the status classifier
#[async_trait]
pub trait BlocklistProvider: Send + Sync {
    /// Returns true if `address` has an unexpired entry at `now`
    async fn is_blocked(&self, address: &str, now: DateTime<Utc>) -> TrackerResult<bool>;

    /// Insert or replace an entry
    async fn block(&self, entry: BlacklistEntry) -> TrackerResult<()>;

    /// Remove an entry; returns whether one existed
    async fn unblock(&self, address: &str) -> TrackerResult<bool>;

    /// Entries unexpired at `now`
    async fn active_entries(&self, now: DateTime<Utc>) -> TrackerResult<Vec<BlacklistEntry>>;
}
