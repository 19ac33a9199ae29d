//! Enrichment aggregator
//!
//! Folds the latest connector responses into the canonical `Token`. It is the
//! only writer of `Token` values; everything downstream of it (tracker,
//! scoring, classifier) runs synchronously inside `merge`.
//!
//! Field precedence is an explicit table keyed by bonding-curve stage: while
//! the token is on its curve the launch platform wins for the fields it
//! reports, after migration the DEX aggregator is authoritative. A source
//! that did not report a field never clears it: the first `Some` along the
//! precedence order wins, and when every source is silent the stored value
//! is kept.

use super::connectors::ConnectorResponses;
use super::lifecycle::{CurveSignals, CurveStateTracker};
use super::scoring::ScoringEngine;
use super::status::StatusClassifier;
use super::timestamp::{elapsed_beyond, normalize_optional};
use super::types::{BondingCurveStatus, SourceKind, Token, WhaleFlag};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Which side of migration the precedence table is read for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OnCurve,
    Migrated,
}

impl Stage {
    pub fn of(status: BondingCurveStatus) -> Self {
        match status {
            BondingCurveStatus::Migrated => Stage::Migrated,
            _ => Stage::OnCurve,
        }
    }
}

/// Token fields fed by more than one source, or by a source whose rank matters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Symbol,
    Name,
    Decimals,
    Supply,
    PriceUsd,
    MarketCap,
    Liquidity,
    Volume24h,
    PriceChange,
    CreatedAt,
    PoolAddress,
}

use SourceKind::{DexAggregator as Dex, LaunchPlatform as Launch, RiskScanner as Risk};

/// Source order for `field` at `stage`, most trusted first
pub fn precedence(field: Field, stage: Stage) -> &'static [SourceKind] {
    match (field, stage) {
        (Field::Symbol | Field::Name, Stage::OnCurve) => &[Launch, Dex, Risk],
        (Field::Symbol | Field::Name, Stage::Migrated) => &[Dex, Launch, Risk],
        (Field::Decimals, Stage::OnCurve) => &[Launch, Risk],
        (Field::Decimals, Stage::Migrated) => &[Risk, Launch],
        (Field::Supply, _) => &[Risk],
        (Field::PriceUsd, _) => &[Dex],
        (Field::MarketCap, Stage::OnCurve) => &[Launch, Dex],
        (Field::MarketCap, Stage::Migrated) => &[Dex, Launch],
        (Field::Liquidity, _) => &[Dex, Risk],
        (Field::Volume24h | Field::PriceChange, _) => &[Dex],
        (Field::CreatedAt, _) => &[Launch, Dex],
        (Field::PoolAddress, Stage::OnCurve) => &[Launch, Dex],
        (Field::PoolAddress, Stage::Migrated) => &[Dex, Launch],
    }
}

/// First value along the precedence order
fn pick<T>(field: Field, stage: Stage, get: impl Fn(SourceKind) -> Option<T>) -> Option<T> {
    precedence(field, stage).iter().find_map(|kind| get(*kind))
}

/// Overwrite only with a known value
fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Relative change above `threshold_pct`; a value appearing for the first time counts
fn moved_beyond(old: Option<f64>, new: Option<f64>, threshold_pct: f64) -> bool {
    match (old, new) {
        (None, Some(_)) => true,
        (Some(a), Some(b)) if a == 0.0 => b != 0.0,
        (Some(a), Some(b)) => ((b - a) / a).abs() * 100.0 > threshold_pct,
        _ => false,
    }
}

/// Per-merge inputs that do not come from the per-token connectors
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub now: DateTime<Utc>,
    pub blacklisted: bool,
    /// Fresh whale summary, `None` when the balance feed did not answer
    pub whale_flags: Option<Vec<WhaleFlag>>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub token: Token,
    /// Anything besides `updated_at` differs from the previous record
    pub changed: bool,
    /// Out-of-cadence snapshot requested
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub significant_change_pct: f64,
    pub unreachable_after: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            significant_change_pct: 10.0,
            unreachable_after: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

#[derive(Debug, Default)]
pub struct EnrichmentAggregator {
    config: AggregatorConfig,
    tracker: CurveStateTracker,
    scorer: ScoringEngine,
    classifier: StatusClassifier,
}

impl EnrichmentAggregator {
    pub fn new(
        config: AggregatorConfig,
        scorer: ScoringEngine,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            config,
            tracker: CurveStateTracker::new(),
            scorer,
            classifier,
        }
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    /// Merge one cycle's responses into the previous record (or a new one)
    pub fn merge(
        &self,
        address: &str,
        previous: Option<&Token>,
        responses: &ConnectorResponses,
        ctx: &MergeContext,
    ) -> MergeOutcome {
        let now = ctx.now;
        let mut token = previous
            .cloned()
            .unwrap_or_else(|| Token::new(address, now));
        let stage = Stage::of(token.bonding_curve_status);

        let launch = responses.launch.as_ref();
        let dex = responses.dex.as_ref();
        let risk = responses.risk.as_ref();

        // Identity
        fill(
            &mut token.symbol,
            pick(Field::Symbol, stage, |k| match k {
                Launch => launch?.symbol.clone(),
                Dex => dex?.symbol.clone(),
                Risk => risk?.symbol.clone(),
                _ => None,
            }),
        );
        fill(
            &mut token.name,
            pick(Field::Name, stage, |k| match k {
                Launch => launch?.name.clone(),
                Dex => dex?.name.clone(),
                Risk => risk?.name.clone(),
                _ => None,
            }),
        );
        fill(
            &mut token.decimals,
            pick(Field::Decimals, stage, |k| match k {
                Launch => launch?.decimals,
                Risk => risk?.decimals,
                _ => None,
            }),
        );
        fill(
            &mut token.total_supply,
            pick(Field::Supply, stage, |k| match k {
                Risk => risk?.supply,
                _ => None,
            }),
        );

        // Market
        fill(
            &mut token.price_usd,
            pick(Field::PriceUsd, stage, |k| match k {
                Dex => dex?.price_usd,
                _ => None,
            }),
        );
        fill(
            &mut token.market_cap_usd,
            pick(Field::MarketCap, stage, |k| match k {
                Launch => launch?.market_cap_usd,
                Dex => dex?.market_cap_usd,
                _ => None,
            }),
        );
        fill(
            &mut token.liquidity_usd,
            pick(Field::Liquidity, stage, |k| match k {
                Dex => dex?.liquidity_usd,
                Risk => risk?.total_liquidity_usd,
                _ => None,
            }),
        );
        fill(
            &mut token.volume_24h_usd,
            pick(Field::Volume24h, stage, |k| match k {
                Dex => dex?.volume_24h_usd,
                _ => None,
            }),
        );
        if let Some(change) = pick(Field::PriceChange, stage, |k| match k {
            Dex => dex.map(|d| d.price_change),
            _ => None,
        }) {
            fill(&mut token.price_change.m5, change.m5);
            fill(&mut token.price_change.h1, change.h1);
            fill(&mut token.price_change.h6, change.h6);
            fill(&mut token.price_change.h24, change.h24);
        }

        // Holders and risk
        if let Some(risk) = risk {
            if let Some(count) = risk.holder_count {
                if let Some(old) = token.holder_count.filter(|old| *old != count && *old > 0) {
                    token.holder_growth_pct = Some((count as f64 - old as f64) / old as f64 * 100.0);
                }
                token.holder_count = Some(count);
            }
            fill(&mut token.holder_distribution.top_holder_pct, risk.distribution.top_holder_pct);
            fill(&mut token.holder_distribution.top10_pct, risk.distribution.top10_pct);
            fill(&mut token.risk.scanner_score, risk.safety_score);
            fill(&mut token.risk.rugged, risk.rugged);
            fill(&mut token.risk.mint_authority_revoked, risk.mint_authority_revoked);
            fill(&mut token.risk.freeze_authority_revoked, risk.freeze_authority_revoked);
            fill(&mut token.risk.lp_locked_pct, risk.lp_locked_pct);
        }

        if let Some(probe) = responses.probe {
            token.is_tradeable = probe.routable;
        }
        if launch.map_or(false, |l| l.has_social_links) || dex.map_or(false, |d| d.has_social_links) {
            token.has_social_links = true;
        }
        if let Some(flags) = &ctx.whale_flags {
            token.whale_flags = flags.clone();
        }

        // Timestamps
        if token.source_created_at.is_none() {
            token.source_created_at = pick(Field::CreatedAt, stage, |k| match k {
                Launch => normalize_optional(launch?.created_timestamp_raw, "created_timestamp", address),
                Dex => normalize_optional(dex?.pair_created_at_raw, "pairCreatedAt", address),
                _ => None,
            });
        }
        if let Some(last_trade) = launch
            .and_then(|l| normalize_optional(l.last_trade_timestamp_raw, "last_trade_timestamp", address))
        {
            token.last_activity_at = Some(token.last_activity_at.map_or(last_trade, |t| t.max(last_trade)));
        }
        if token.last_activity_at.is_none() && token.volume_24h_usd.map_or(false, |v| v > 0.0) {
            token.last_activity_at = Some(now);
        }
        if dex.is_some() && token.dex_first_seen_at.is_none() {
            token.dex_first_seen_at = Some(now);
        }

        // Lifecycle
        let pool = pick(Field::PoolAddress, stage, |k| match k {
            Launch => launch?.pool_address.clone(),
            Dex => dex?.pool_address.clone(),
            _ => None,
        });
        let signals = CurveSignals {
            volume_seen: token.last_activity_at.is_some(),
            launch_complete: launch.map(|l| l.curve_complete),
            pool_associated: pool.is_some() || token.raydium_pool_address.is_some(),
            withdrawn: launch.map_or(false, |l| l.withdrawn),
            unreachable: false,
        };
        token.bonding_curve_status = self.tracker.advance(address, token.bonding_curve_status, &signals);
        if token.bonding_curve_status == BondingCurveStatus::Migrated && token.raydium_pool_address.is_none() {
            token.raydium_pool_address = pool;
        }

        // Heartbeat, never decreasing
        token.updated_at = token.updated_at.max(now);

        self.finish(previous, token, ctx)
    }

    /// Re-apply time-based rules when no source answered this cycle
    ///
    /// Not a merge: `updated_at` is left alone so it keeps marking the last
    /// time any source answered, which is what the unreachable rule measures.
    pub fn reevaluate(&self, previous: &Token, ctx: &MergeContext) -> MergeOutcome {
        let mut token = previous.clone();

        let signals = CurveSignals {
            volume_seen: token.last_activity_at.is_some(),
            launch_complete: None,
            pool_associated: token.raydium_pool_address.is_some(),
            withdrawn: false,
            unreachable: token.bonding_curve_status.is_pre_migration()
                && elapsed_beyond(token.updated_at, ctx.now, self.config.unreachable_after),
        };
        token.bonding_curve_status = self
            .tracker
            .advance(&token.address, token.bonding_curve_status, &signals);

        if let Some(flags) = &ctx.whale_flags {
            token.whale_flags = flags.clone();
        }

        self.finish(Some(previous), token, ctx)
    }

    fn finish(&self, previous: Option<&Token>, mut token: Token, ctx: &MergeContext) -> MergeOutcome {
        self.scorer.apply(&mut token, ctx.now);
        token.status = self.classifier.classify(&token, ctx.blacklisted, ctx.now);

        let (changed, significant) = match previous {
            None => (true, true),
            Some(prev) => {
                let mut heartbeat_only = prev.clone();
                heartbeat_only.updated_at = token.updated_at;
                let changed = heartbeat_only != token;

                let threshold = self.config.significant_change_pct;
                let significant = changed
                    && (prev.status != token.status
                        || prev.bonding_curve_status != token.bonding_curve_status
                        || moved_beyond(prev.liquidity_usd, token.liquidity_usd, threshold)
                        || moved_beyond(prev.volume_24h_usd, token.volume_24h_usd, threshold)
                        || moved_beyond(Some(prev.invest_score), Some(token.invest_score), threshold)
                        || moved_beyond(Some(prev.rug_score), Some(token.rug_score), threshold));
                (changed, significant)
            }
        };

        MergeOutcome {
            token,
            changed,
            significant,
        }
    }
}
