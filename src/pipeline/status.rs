//! Status classifier
//!
//! Priority, first match wins:
//! 1. `blacklisted` when the address is on the blacklist
//! 2. `unknown` when the record breaks a data-model invariant
//! 3. `no_dex_data` while the DEX aggregator has never answered
//! 4. `archived` for terminated tokens older than the archive window
//! 5. `inactive` with no volume and no activity inside the inactivity window
//! 6. `active`

use super::config::StatusConfig;
use super::timestamp::elapsed_beyond;
use super::types::{BondingCurveStatus, Token, TokenStatus};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StatusClassifier {
    config: StatusConfig,
    unknown_count: AtomicU64,
}

impl StatusClassifier {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config,
            unknown_count: AtomicU64::new(0),
        }
    }

    /// Number of `unknown` classifications since startup
    pub fn unknown_count(&self) -> u64 {
        self.unknown_count.load(Ordering::Relaxed)
    }

    pub fn classify(&self, token: &Token, blacklisted: bool, now: DateTime<Utc>) -> TokenStatus {
        if blacklisted {
            return TokenStatus::Blacklisted;
        }

        if token.updated_at < token.first_discovered_at {
            let count = self.unknown_count.fetch_add(1, Ordering::Relaxed) + 1;
            log::error!(
                "❌ {} has updated_at {} before first_discovered_at {} (unknown status #{})",
                token.address,
                token.updated_at,
                token.first_discovered_at,
                count
            );
            return TokenStatus::Unknown;
        }

        if token.dex_first_seen_at.is_none() {
            return TokenStatus::NoDexData;
        }

        if token.bonding_curve_status == BondingCurveStatus::Terminated
            && elapsed_beyond(token.first_discovered_at, now, self.config.archive_after)
        {
            return TokenStatus::Archived;
        }

        let has_volume = token.volume_24h_usd.map_or(false, |v| v > 0.0);
        let last_activity = token.last_activity_at.unwrap_or(token.first_discovered_at);
        if !has_volume && elapsed_beyond(last_activity, now, self.config.inactive_after) {
            return TokenStatus::Inactive;
        }

        TokenStatus::Active
    }
}
