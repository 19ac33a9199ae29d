//! Core data structures for the tracker pipeline
//!
//! `Token` is the canonical per-address record (table `tokens`),
//! `TokenSnapshot` is its append-only history row (table `tokens_hist`) and
//! `BalanceChangeEvent` is one classified balance delta (table
//! `balance_change_events`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External data sources feeding the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LaunchPlatform,
    DexAggregator,
    RiskScanner,
    LiquidityProbe,
    BalanceFeed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LaunchPlatform => "launch_platform",
            SourceKind::DexAggregator => "dex_aggregator",
            SourceKind::RiskScanner => "risk_scanner",
            SourceKind::LiquidityProbe => "liquidity_probe",
            SourceKind::BalanceFeed => "balance_feed",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bonding-curve lifecycle state
///
/// Forward order: `Created < Active < Completed < Migrated`.
/// `Terminated` sits outside the order and is reachable from any of the
/// first three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondingCurveStatus {
    Created,
    Active,
    Completed,
    Migrated,
    Terminated,
}

impl BondingCurveStatus {
    /// Position in the forward order, `None` for `Terminated`
    pub fn rank(&self) -> Option<u8> {
        match self {
            BondingCurveStatus::Created => Some(0),
            BondingCurveStatus::Active => Some(1),
            BondingCurveStatus::Completed => Some(2),
            BondingCurveStatus::Migrated => Some(3),
            BondingCurveStatus::Terminated => None,
        }
    }

    /// The state one step further along the forward order
    pub fn next(&self) -> Option<BondingCurveStatus> {
        match self {
            BondingCurveStatus::Created => Some(BondingCurveStatus::Active),
            BondingCurveStatus::Active => Some(BondingCurveStatus::Completed),
            BondingCurveStatus::Completed => Some(BondingCurveStatus::Migrated),
            BondingCurveStatus::Migrated | BondingCurveStatus::Terminated => None,
        }
    }

    /// `Migrated` and `Terminated` accept no further transitions
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            BondingCurveStatus::Migrated | BondingCurveStatus::Terminated
        )
    }

    /// Still trading on the launch platform's curve
    pub fn is_pre_migration(&self) -> bool {
        matches!(
            self,
            BondingCurveStatus::Created | BondingCurveStatus::Active | BondingCurveStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BondingCurveStatus::Created => "created",
            BondingCurveStatus::Active => "active",
            BondingCurveStatus::Completed => "completed",
            BondingCurveStatus::Migrated => "migrated",
            BondingCurveStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(BondingCurveStatus::Created),
            "active" => Some(BondingCurveStatus::Active),
            "completed" => Some(BondingCurveStatus::Completed),
            "migrated" => Some(BondingCurveStatus::Migrated),
            "terminated" => Some(BondingCurveStatus::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for BondingCurveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse operational status used for retention and query filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Inactive,
    NoDexData,
    Archived,
    Blacklisted,
    Unknown,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Inactive => "inactive",
            TokenStatus::NoDexData => "no_dex_data",
            TokenStatus::Archived => "archived",
            TokenStatus::Blacklisted => "blacklisted",
            TokenStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TokenStatus::Active),
            "inactive" => Some(TokenStatus::Inactive),
            "no_dex_data" => Some(TokenStatus::NoDexData),
            "archived" => Some(TokenStatus::Archived),
            "blacklisted" => Some(TokenStatus::Blacklisted),
            "unknown" => Some(TokenStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a snapshot row was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Scheduled,
    SignificantChange,
    Manual,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::Scheduled => "scheduled",
            SnapshotReason::SignificantChange => "significant_change",
            SnapshotReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(SnapshotReason::Scheduled),
            "significant_change" => Some(SnapshotReason::SignificantChange),
            "manual" => Some(SnapshotReason::Manual),
            _ => None,
        }
    }
}

/// Price-change percentages over the windows the DEX aggregator reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

/// Holder concentration summary from the risk scanner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HolderDistribution {
    /// Percent of supply held by the single largest holder
    pub top_holder_pct: Option<f64>,
    /// Percent of supply held by the ten largest holders
    pub top10_pct: Option<f64>,
}

/// Risk-scanner verdict and lock signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSignals {
    /// Scanner safety verdict, 0-100, higher = safer
    pub scanner_score: Option<f64>,
    pub rugged: Option<bool>,
    pub mint_authority_revoked: Option<bool>,
    pub freeze_authority_revoked: Option<bool>,
    /// Percent of LP tokens locked or burned
    pub lp_locked_pct: Option<f64>,
}

/// Activity tags derived from recent large balance changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleFlag {
    WhaleAccumulation,
    WhaleDistribution,
    CriticalWhaleMove,
}

/// Canonical token record, one per mint address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    /// Total supply in UI units
    pub total_supply: Option<f64>,

    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub price_change: PriceChange,

    pub holder_count: Option<u64>,
    pub holder_distribution: HolderDistribution,
    /// Relative holder-count growth measured at the last holder-count change
    pub holder_growth_pct: Option<f64>,

    pub risk: RiskSignals,
    pub has_social_links: bool,
    pub whale_flags: Vec<WhaleFlag>,

    pub rug_score: f64,
    pub invest_score: f64,
    pub early_bonus: f64,
    pub social_bonus: f64,
    pub holders_bonus: f64,

    pub bonding_curve_status: BondingCurveStatus,
    pub raydium_pool_address: Option<String>,
    pub is_tradeable: bool,
    pub status: TokenStatus,

    /// Creation instant reported by a source (normalized)
    pub source_created_at: Option<DateTime<Utc>>,
    pub first_discovered_at: DateTime<Utc>,
    /// Last merge; merges only run when at least one source answered
    pub updated_at: DateTime<Utc>,
    /// Last merge in which non-zero volume was observed
    pub last_activity_at: Option<DateTime<Utc>>,
    /// First merge in which the DEX aggregator answered
    pub dex_first_seen_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Fresh record for a newly observed address
    pub fn new(address: &str, now: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            symbol: None,
            name: None,
            decimals: None,
            total_supply: None,
            price_usd: None,
            market_cap_usd: None,
            liquidity_usd: None,
            volume_24h_usd: None,
            price_change: PriceChange::default(),
            holder_count: None,
            holder_distribution: HolderDistribution::default(),
            holder_growth_pct: None,
            risk: RiskSignals::default(),
            has_social_links: false,
            whale_flags: Vec::new(),
            rug_score: 0.0,
            invest_score: 0.0,
            early_bonus: 0.0,
            social_bonus: 0.0,
            holders_bonus: 0.0,
            bonding_curve_status: BondingCurveStatus::Created,
            raydium_pool_address: None,
            is_tradeable: false,
            status: TokenStatus::NoDexData,
            source_created_at: None,
            first_discovered_at: now,
            updated_at: now,
            last_activity_at: None,
            dex_first_seen_at: None,
        }
    }

    /// Hours since first discovery, evaluated at `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.first_discovered_at).num_seconds().max(0);
        secs as f64 / 3600.0
    }

    /// Read-time ranking projection, never persisted
    pub fn risk_adjusted_score(&self) -> f64 {
        self.invest_score * self.rug_score / 100.0
    }
}

/// Immutable copy of a `Token` at capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub token: Token,
    pub snapshot_timestamp: DateTime<Utc>,
    pub snapshot_reason: SnapshotReason,
}

/// Classified type of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceEventKind {
    Buy,
    Sell,
    Transfer,
    SolTransfer,
}

impl BalanceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceEventKind::Buy => "buy",
            BalanceEventKind::Sell => "sell",
            BalanceEventKind::Transfer => "transfer",
            BalanceEventKind::SolTransfer => "sol_transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(BalanceEventKind::Buy),
            "sell" => Some(BalanceEventKind::Sell),
            "transfer" => Some(BalanceEventKind::Transfer),
            "sol_transfer" => Some(BalanceEventKind::SolTransfer),
            _ => None,
        }
    }
}

/// Materiality of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Large,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Large => "large",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Severity::Normal),
            "large" => Some(Severity::Large),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// One observed on-chain balance delta, keyed by transaction signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChangeEvent {
    pub signature: String,
    pub wallet: String,
    pub token_mint: String,
    /// Signed token delta in UI units
    pub token_amount: f64,
    /// Signed SOL delta
    pub sol_amount: f64,
    pub block_time: DateTime<Utc>,
    pub kind: BalanceEventKind,
    pub is_large_token_amount: bool,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bonding_curve_order() {
        let order = [
            BondingCurveStatus::Created,
            BondingCurveStatus::Active,
            BondingCurveStatus::Completed,
            BondingCurveStatus::Migrated,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(BondingCurveStatus::Terminated.rank(), None);
        assert!(BondingCurveStatus::Terminated.is_final());
        assert!(!BondingCurveStatus::Completed.is_final());
    }

    #[test]
    fn test_enum_strings_roundtrip() {
        for status in [
            TokenStatus::Active,
            TokenStatus::Inactive,
            TokenStatus::NoDexData,
            TokenStatus::Archived,
            TokenStatus::Blacklisted,
            TokenStatus::Unknown,
        ] {
            assert_eq!(TokenStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BondingCurveStatus::parse("graduated"), None);
        assert_eq!(
            SnapshotReason::parse("significant_change"),
            Some(SnapshotReason::SignificantChange)
        );
    }

    #[test]
    fn test_age_and_risk_adjusted() {
        let discovered = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut token = Token::new("mint", discovered);
        token.invest_score = 80.0;
        token.rug_score = 50.0;

        let later = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
        assert!((token.age_hours(later) - 6.5).abs() < 1e-9);
        assert_eq!(token.age_hours(discovered - chrono::Duration::hours(1)), 0.0);
        assert!((token.risk_adjusted_score() - 40.0).abs() < 1e-9);
    }
}
