//! Scoring Engine
//!
//! ## Scoring Algorithm
//!
//! **rug_score** (0-100, higher = safer), weighted over the components that
//! are known; a token with no risk data at all sits at a neutral 50:
//! - Scanner verdict (40%): risk scanner safety score as reported
//! - Lock signals (35%): mint authority revoked, freeze authority revoked,
//!   percent of LP locked or burned
//! - Concentration (25%): penalizes a dominant top holder and a heavy top 10
//! - A scanner `rugged` verdict forces 0
//!
//! **invest_score** (0-100): weighted sum of five sub-scores, each clamped
//! to [0,100] before weighting, plus bonuses:
//! - Security: the rug_score
//! - Momentum: 1h and 24h price change around a neutral 50
//! - Liquidity depth: log scale, $1k = 0 up to $1M = 100
//! - Holder count: log scale, 1 = 0 up to 10k = 100
//! - Distribution: 100 minus the top-10 holder percent
//! - `early_bonus`: flat bonus while younger than the age threshold
//! - `social_bonus`: flat bonus when any social link is known
//! - `holders_bonus`: scales with holder growth up to the full-growth level
//!
//! Every intermediate value passes through `clamp_score`. Identical inputs
//! always give identical scores; the evaluation instant only enters through
//! the token's age.

use super::config::ScoringConfig;
use super::error::{TrackerError, TrackerResult};
use super::types::Token;
use chrono::{DateTime, Utc};

const NEUTRAL: f64 = 50.0;

/// Accept a score in [0,100], reject anything else (NaN included)
pub fn checked_score(value: f64) -> TrackerResult<f64> {
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(TrackerError::ScoreOutOfRange(value))
    }
}

/// Clamp into [0,100]; NaN becomes 0
pub fn clamp_score(value: f64) -> f64 {
    clamp_to(value, 100.0)
}

fn clamp_to(value: f64, max: f64) -> f64 {
    match checked_score(value) {
        Ok(v) if v <= max => v,
        Ok(_) => max,
        Err(TrackerError::ScoreOutOfRange(raw)) if raw.is_nan() => 0.0,
        Err(_) => value.clamp(0.0, max),
    }
}

/// log10 scale between two anchors, mapped to [0,100]
fn log_scale(value: f64, zero_at: f64, full_at: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    let span = full_at.log10() - zero_at.log10();
    clamp_score((value.log10() - zero_at.log10()) / span * 100.0)
}

/// Weighted mean over the components that are `Some`
fn weighted_known(parts: &[(Option<f64>, f64)]) -> Option<f64> {
    let (sum, weight) = parts
        .iter()
        .filter_map(|(value, w)| value.map(|v| (clamp_score(v) * w, *w)))
        .fold((0.0, 0.0), |(s, tw), (v, w)| (s + v, tw + w));
    (weight > 0.0).then(|| sum / weight)
}

fn flag_score(flag: Option<bool>) -> Option<f64> {
    flag.map(|revoked| if revoked { 100.0 } else { 0.0 })
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn rug_score(&self, token: &Token) -> f64 {
        if token.risk.rugged == Some(true) {
            return 0.0;
        }

        let locks = weighted_known(&[
            (flag_score(token.risk.mint_authority_revoked), 1.0),
            (flag_score(token.risk.freeze_authority_revoked), 1.0),
            (token.risk.lp_locked_pct, 1.0),
        ]);

        let dist = &token.holder_distribution;
        let concentration = weighted_known(&[
            (dist.top_holder_pct.map(|p| 100.0 - 2.0 * p), 1.0),
            (dist.top10_pct.map(|p| 100.0 - p), 1.0),
        ]);

        let score = weighted_known(&[
            (token.risk.scanner_score, 0.40),
            (locks, 0.35),
            (concentration, 0.25),
        ])
        .unwrap_or(NEUTRAL);

        clamp_score(score)
    }

    fn momentum(token: &Token) -> f64 {
        let h1 = token.price_change.h1.unwrap_or(0.0);
        let h24 = token.price_change.h24.unwrap_or(0.0);
        clamp_score(NEUTRAL + 0.5 * h1 + 0.2 * h24)
    }

    /// Early bonus, full value under the age threshold and nothing after
    pub fn early_bonus(&self, token: &Token, now: DateTime<Utc>) -> f64 {
        if token.age_hours(now) < self.config.early_age_hours {
            clamp_to(self.config.early_bonus_max, self.config.early_bonus_max)
        } else {
            0.0
        }
    }

    pub fn social_bonus(&self, token: &Token) -> f64 {
        if token.has_social_links {
            clamp_to(self.config.social_bonus_max, self.config.social_bonus_max)
        } else {
            0.0
        }
    }

    pub fn holders_bonus(&self, token: &Token) -> f64 {
        let max = self.config.holders_bonus_max;
        match token.holder_growth_pct {
            Some(growth) if growth > 0.0 && self.config.holder_growth_full_pct > 0.0 => {
                let ratio = (growth / self.config.holder_growth_full_pct).min(1.0);
                clamp_to(ratio * max, max)
            }
            _ => 0.0,
        }
    }

    /// Invest score from an already computed rug score
    pub fn invest_score(&self, token: &Token, rug_score: f64, now: DateTime<Utc>) -> f64 {
        let w = &self.config.weights;

        let liquidity = token.liquidity_usd.map_or(0.0, |l| log_scale(l, 1_000.0, 1_000_000.0));
        let holders = token.holder_count.map_or(0.0, |c| log_scale(c as f64, 1.0, 10_000.0));
        let distribution = token
            .holder_distribution
            .top10_pct
            .map_or(NEUTRAL, |p| clamp_score(100.0 - p));

        let base = clamp_score(rug_score) * w.security
            + Self::momentum(token) * w.momentum
            + liquidity * w.liquidity
            + holders * w.holders
            + distribution * w.distribution;

        let bonuses = self.early_bonus(token, now) + self.social_bonus(token) + self.holders_bonus(token);

        clamp_score(clamp_score(base) + bonuses)
    }

    /// Recompute every score and bonus on `token`
    pub fn apply(&self, token: &mut Token, now: DateTime<Utc>) {
        let rug = self.rug_score(token);
        token.rug_score = rug;
        token.invest_score = self.invest_score(token, rug, now);
        token.early_bonus = self.early_bonus(token, now);
        token.social_bonus = self.social_bonus(token);
        token.holders_bonus = self.holders_bonus(token);
    }
}
