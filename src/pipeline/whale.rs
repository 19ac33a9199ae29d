//! Whale activity detector
//!
//! Turns raw balance legs into at most one `BalanceChangeEvent` per
//! transaction signature, persists them (signature is the idempotency key)
//! and summarises recent large events into token activity flags.
//!
//! Classification of the representative leg:
//!
//! | token delta | SOL delta        | kind           |
//! |-------------|------------------|----------------|
//! | > 0         | < 0              | `buy`          |
//! | < 0         | > 0              | `sell`         |
//! | != 0        | no counter-leg   | `transfer`     |
//! | 0           | != 0             | `sol_transfer` |

use super::config::WhaleConfig;
use super::connectors::BalanceLeg;
use super::db::TokenStore;
use super::error::TrackerError;
use super::timestamp::{normalize_timestamp, window};
use super::types::{BalanceChangeEvent, BalanceEventKind, Severity, WhaleFlag};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub fn classify_kind(token_amount: f64, sol_amount: f64) -> Option<BalanceEventKind> {
    match (token_amount, sol_amount) {
        (t, s) if t > 0.0 && s < 0.0 => Some(BalanceEventKind::Buy),
        (t, s) if t < 0.0 && s > 0.0 => Some(BalanceEventKind::Sell),
        (t, _) if t != 0.0 => Some(BalanceEventKind::Transfer),
        (_, s) if s != 0.0 => Some(BalanceEventKind::SolTransfer),
        _ => None,
    }
}

/// Ordering of candidate token legs, greatest is the trader's side
///
/// The fee payer signed the transaction, so its leg wins. Otherwise a leg
/// with an opposite-signed SOL counterpart beats a bare transfer, a buy beats
/// the pool's mirrored sell, and the absolute token delta breaks the rest.
fn trader_order(a: &BalanceLeg, b: &BalanceLeg) -> Ordering {
    let side = |leg: &BalanceLeg| match classify_kind(leg.token_amount, leg.sol_amount) {
        Some(BalanceEventKind::Buy) => 2u8,
        Some(BalanceEventKind::Sell) => 1,
        _ => 0,
    };
    a.fee_payer
        .cmp(&b.fee_payer)
        .then_with(|| side(a).cmp(&side(b)))
        .then_with(|| a.token_amount.abs().total_cmp(&b.token_amount.abs()))
}

/// Outcome of persisting one detection batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub inserted: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WhaleDetector {
    config: WhaleConfig,
}

impl WhaleDetector {
    pub fn new(config: WhaleConfig) -> Self {
        Self { config }
    }

    pub fn summary_window(&self) -> std::time::Duration {
        self.config.summary_window
    }

    /// Severity of a token movement given the mint's supply, if known
    pub fn severity(&self, token_amount: f64, supply: Option<f64>) -> Severity {
        let amount = token_amount.abs();
        let pct = supply
            .filter(|s| *s > 0.0)
            .map(|s| amount / s * 100.0);
        let beyond = |abs: f64, pct_threshold: f64| {
            amount >= abs || pct.map_or(false, |p| p >= pct_threshold)
        };

        if !beyond(self.config.large_token_amount, self.config.large_supply_pct) {
            Severity::Normal
        } else if beyond(self.config.critical_token_amount, self.config.critical_supply_pct) {
            Severity::Critical
        } else {
            Severity::Large
        }
    }

    /// One event per signature for `mint`
    ///
    /// The representative leg of a transaction is the trader's side, ranked
    /// by `trader_order`; transactions without any token delta fall back to
    /// the largest SOL delta. Legs with an unusable block time are dropped.
    pub fn detect(&self, mint: &str, legs: &[BalanceLeg], supply: Option<f64>) -> Vec<BalanceChangeEvent> {
        let mut by_signature: BTreeMap<&str, Vec<&BalanceLeg>> = BTreeMap::new();
        for leg in legs {
            let foreign = leg.token_mint.as_deref().map_or(false, |m| m != mint);
            if !foreign {
                by_signature.entry(leg.signature.as_str()).or_default().push(leg);
            }
        }

        let mut events = Vec::with_capacity(by_signature.len());
        for (signature, group) in by_signature {
            let token_leg = group
                .iter()
                .filter(|l| l.token_amount != 0.0)
                .max_by(|a, b| trader_order(a, b));
            let leg = match token_leg {
                Some(leg) => *leg,
                None => match group
                    .iter()
                    .filter(|l| l.sol_amount != 0.0)
                    .max_by(|a, b| a.sol_amount.abs().total_cmp(&b.sol_amount.abs()))
                {
                    Some(leg) => *leg,
                    None => continue,
                },
            };

            let Some(kind) = classify_kind(leg.token_amount, leg.sol_amount) else {
                continue;
            };

            let block_time = match normalize_timestamp(leg.block_time_raw) {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("⚠️  Skipping balance change {}: {}", signature, e);
                    continue;
                }
            };

            let severity = if kind == BalanceEventKind::SolTransfer {
                Severity::Normal
            } else {
                self.severity(leg.token_amount, supply)
            };

            events.push(BalanceChangeEvent {
                signature: signature.to_string(),
                wallet: leg.wallet.clone(),
                token_mint: mint.to_string(),
                token_amount: leg.token_amount,
                sol_amount: leg.sol_amount,
                block_time,
                kind,
                is_large_token_amount: severity >= Severity::Large,
                severity,
            });
        }
        events
    }

    /// Persist events, ignoring signatures already stored
    pub async fn record<S: TokenStore + ?Sized>(
        &self,
        store: &S,
        events: &[BalanceChangeEvent],
    ) -> Result<RecordStats, TrackerError> {
        let mut stats = RecordStats::default();
        for event in events {
            match store.insert_balance_event(event).await {
                Ok(()) => {
                    stats.inserted += 1;
                    if event.severity == Severity::Critical {
                        log::warn!(
                            "🐋 Critical {} of {:.0} {} by {} ({})",
                            event.kind.as_str(),
                            event.token_amount.abs(),
                            event.token_mint,
                            event.wallet,
                            event.signature
                        );
                    }
                }
                Err(TrackerError::DuplicateEvent(signature)) => {
                    log::debug!("Duplicate balance change {} ignored", signature);
                    stats.duplicates += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(stats)
    }

    /// Activity flags from large events inside the summary window
    pub fn summarize(&self, events: &[BalanceChangeEvent], now: DateTime<Utc>) -> Vec<WhaleFlag> {
        let cutoff = now - window(self.config.summary_window);
        let recent = events
            .iter()
            .filter(|e| e.is_large_token_amount && e.block_time >= cutoff && e.block_time <= now);

        let mut bought = 0.0;
        let mut sold = 0.0;
        let mut critical = false;
        for event in recent {
            match event.kind {
                BalanceEventKind::Buy => bought += event.token_amount.abs(),
                BalanceEventKind::Sell => sold += event.token_amount.abs(),
                BalanceEventKind::Transfer | BalanceEventKind::SolTransfer => {}
            }
            critical |= event.severity == Severity::Critical;
        }

        let mut flags = Vec::new();
        if bought > sold {
            flags.push(WhaleFlag::WhaleAccumulation);
        } else if sold > bought {
            flags.push(WhaleFlag::WhaleDistribution);
        }
        if critical {
            flags.push(WhaleFlag::CriticalWhaleMove);
        }
        flags
    }
}
