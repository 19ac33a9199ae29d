//! Read-only query interface
//!
//! Current tokens come from the in-memory table (whole records only);
//! snapshot history and balance events come from the store's reader
//! connection. Nothing here writes.

use super::db::TokenStore;
use super::error::TrackerResult;
use super::table::TokenTable;
use super::types::{BalanceChangeEvent, BondingCurveStatus, Token, TokenSnapshot, TokenStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Filter over the current Token table; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenFilter {
    pub statuses: Option<Vec<TokenStatus>>,
    pub bonding_curve_statuses: Option<Vec<BondingCurveStatus>>,
    pub min_invest_score: Option<f64>,
    pub max_invest_score: Option<f64>,
    pub min_rug_score: Option<f64>,
    pub max_rug_score: Option<f64>,
    pub min_age_hours: Option<f64>,
    pub max_age_hours: Option<f64>,
    pub min_liquidity_usd: Option<f64>,
    pub min_volume_24h_usd: Option<f64>,
    pub limit: Option<usize>,
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m)
}

impl TokenFilter {
    /// Tokens with an unknown liquidity or volume never pass a minimum on it
    pub fn matches(&self, token: &Token, now: DateTime<Utc>) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&token.status) {
                return false;
            }
        }
        if let Some(curves) = &self.bonding_curve_statuses {
            if !curves.contains(&token.bonding_curve_status) {
                return false;
            }
        }
        if let Some(min) = self.min_liquidity_usd {
            if token.liquidity_usd.map_or(true, |l| l < min) {
                return false;
            }
        }
        if let Some(min) = self.min_volume_24h_usd {
            if token.volume_24h_usd.map_or(true, |v| v < min) {
                return false;
            }
        }

        within(token.invest_score, self.min_invest_score, self.max_invest_score)
            && within(token.rug_score, self.min_rug_score, self.max_rug_score)
            && within(token.age_hours(now), self.min_age_hours, self.max_age_hours)
    }
}

/// Filter over stored balance-change events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub token_mint: Option<String>,
    pub large_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// A token as presented to readers, with read-time projections
#[derive(Debug, Clone, Serialize)]
pub struct TokenView {
    #[serde(flatten)]
    pub token: Token,
    pub age_hours: f64,
    pub risk_adjusted_score: f64,
}

impl TokenView {
    pub fn new(token: &Token, now: DateTime<Utc>) -> Self {
        Self {
            token: token.clone(),
            age_hours: token.age_hours(now),
            risk_adjusted_score: token.risk_adjusted_score(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

/// Change of one metric between the oldest and newest snapshot of a range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Drift {
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub change_pct: Option<f64>,
    pub direction: TrendDirection,
}

impl Drift {
    fn between(first: Option<f64>, last: Option<f64>, threshold_pct: f64) -> Self {
        let change_pct = match (first, last) {
            (Some(a), Some(b)) if a != 0.0 => Some((b - a) / a.abs() * 100.0),
            (Some(a), Some(b)) if a == 0.0 && b > 0.0 => Some(100.0),
            (Some(_), Some(_)) => Some(0.0),
            _ => None,
        };
        let direction = match change_pct {
            Some(pct) if pct > threshold_pct => TrendDirection::Rising,
            Some(pct) if pct < -threshold_pct => TrendDirection::Falling,
            _ => TrendDirection::Flat,
        };
        Self {
            first,
            last,
            change_pct,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub address: String,
    pub snapshots: usize,
    pub liquidity: Drift,
    pub volume: Drift,
    pub invest_score: Drift,
}

/// Drift of liquidity, volume and invest score across `history`
///
/// `history` must be ordered oldest first, as `snapshot_history` returns it.
pub fn trend_from_history(address: &str, history: &[TokenSnapshot], threshold_pct: f64) -> TrendReport {
    let first = history.first().map(|s| &s.token);
    let last = history.last().map(|s| &s.token);

    TrendReport {
        address: address.to_string(),
        snapshots: history.len(),
        liquidity: Drift::between(
            first.and_then(|t| t.liquidity_usd),
            last.and_then(|t| t.liquidity_usd),
            threshold_pct,
        ),
        volume: Drift::between(
            first.and_then(|t| t.volume_24h_usd),
            last.and_then(|t| t.volume_24h_usd),
            threshold_pct,
        ),
        invest_score: Drift::between(
            first.map(|t| t.invest_score),
            last.map(|t| t.invest_score),
            threshold_pct,
        ),
    }
}

/// Read-only facade over the table and the store
pub struct TokenQuery {
    table: Arc<TokenTable>,
    store: Arc<dyn TokenStore>,
    significant_change_pct: f64,
}

impl TokenQuery {
    pub fn new(table: Arc<TokenTable>, store: Arc<dyn TokenStore>, significant_change_pct: f64) -> Self {
        Self {
            table,
            store,
            significant_change_pct,
        }
    }

    pub fn token(&self, address: &str, now: DateTime<Utc>) -> Option<TokenView> {
        self.table.get(address).map(|t| TokenView::new(&t, now))
    }

    /// Matching tokens ordered by risk-adjusted score, best first
    pub fn tokens(&self, filter: &TokenFilter, now: DateTime<Utc>) -> Vec<TokenView> {
        let mut views: Vec<TokenView> = self
            .table
            .all()
            .iter()
            .filter(|t| filter.matches(t, now))
            .map(|t| TokenView::new(t, now))
            .collect();

        views.sort_by(|a, b| {
            b.risk_adjusted_score
                .total_cmp(&a.risk_adjusted_score)
                .then_with(|| a.token.address.cmp(&b.token.address))
        });
        if let Some(limit) = filter.limit {
            views.truncate(limit);
        }
        views
    }

    pub async fn history(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TrackerResult<Vec<TokenSnapshot>> {
        self.store.snapshot_history(address, from, to).await
    }

    pub async fn trend(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TrackerResult<TrendReport> {
        let history = self.store.snapshot_history(address, from, to).await?;
        Ok(trend_from_history(address, &history, self.significant_change_pct))
    }

    pub async fn balance_events(&self, filter: &EventFilter) -> TrackerResult<Vec<BalanceChangeEvent>> {
        self.store.balance_events(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SnapshotReason;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn token(address: &str, invest: f64, rug: f64, age_hours: i64) -> Token {
        let mut t = Token::new(address, now() - Duration::hours(age_hours));
        t.invest_score = invest;
        t.rug_score = rug;
        t.status = TokenStatus::Active;
        t.liquidity_usd = Some(invest * 1_000.0);
        t
    }

    #[test]
    fn test_filter_ranges() {
        let t = token("a", 60.0, 80.0, 5);
        let mut filter = TokenFilter {
            min_invest_score: Some(50.0),
            max_age_hours: Some(6.0),
            ..TokenFilter::default()
        };
        assert!(filter.matches(&t, now()));

        filter.max_age_hours = Some(4.0);
        assert!(!filter.matches(&t, now()));

        let filter = TokenFilter {
            statuses: Some(vec![TokenStatus::Inactive]),
            ..TokenFilter::default()
        };
        assert!(!filter.matches(&t, now()));
    }

    #[test]
    fn test_unknown_volume_fails_minimum() {
        let t = token("a", 60.0, 80.0, 5);
        let filter = TokenFilter {
            min_volume_24h_usd: Some(0.0),
            ..TokenFilter::default()
        };
        assert!(!filter.matches(&t, now()));
    }

    #[test]
    fn test_view_projection() {
        let view = TokenView::new(&token("a", 80.0, 50.0, 3), now());
        assert_eq!(view.risk_adjusted_score, 40.0);
        assert_eq!(view.age_hours, 3.0);
    }

    #[test]
    fn test_trend_from_history() {
        let snap = |hours: i64, liquidity: f64, volume: Option<f64>| {
            let mut t = token("a", 50.0, 50.0, 10);
            t.liquidity_usd = Some(liquidity);
            t.volume_24h_usd = volume;
            TokenSnapshot {
                token: t,
                snapshot_timestamp: now() + Duration::hours(hours),
                snapshot_reason: SnapshotReason::Scheduled,
            }
        };
        let history = vec![snap(0, 10_000.0, Some(5_000.0)), snap(1, 12_500.0, Some(4_800.0))];

        let report = trend_from_history("a", &history, 10.0);
        assert_eq!(report.snapshots, 2);
        assert_eq!(report.liquidity.direction, TrendDirection::Rising);
        assert_eq!(report.liquidity.change_pct, Some(25.0));
        assert_eq!(report.volume.direction, TrendDirection::Flat);
        assert_eq!(report.invest_score.direction, TrendDirection::Flat);

        let empty = trend_from_history("a", &[], 10.0);
        assert_eq!(empty.liquidity.change_pct, None);
    }
}
