//! Source timestamp normalization
//!
//! Sources disagree on epoch units: pump.fun reports milliseconds,
//! DexScreener milliseconds for `pairCreatedAt`, Helius seconds for block
//! time. Every source timestamp goes through `normalize_timestamp` so that
//! age calculations agree across components.
//!
//! Rule: values above 1e12 are read as milliseconds, everything else as
//! seconds. If the resulting year falls outside [2020, 2030] the opposite
//! unit is tried once before giving up with `InvalidTimestamp`.

use super::error::{TrackerError, TrackerResult};
use chrono::{DateTime, Datelike, TimeZone, Utc};

const MILLIS_CUTOFF: i64 = 1_000_000_000_000;
const MIN_YEAR: i32 = 2020;
const MAX_YEAR: i32 = 2030;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochUnit {
    Seconds,
    Millis,
}

impl EpochUnit {
    fn opposite(self) -> Self {
        match self {
            EpochUnit::Seconds => EpochUnit::Millis,
            EpochUnit::Millis => EpochUnit::Seconds,
        }
    }
}

/// Interpret `raw` in `unit`, truncated to whole seconds, if the year is sane
fn interpret(raw: i64, unit: EpochUnit) -> Option<DateTime<Utc>> {
    let secs = match unit {
        EpochUnit::Seconds => raw,
        EpochUnit::Millis => raw.div_euclid(1000),
    };
    let instant = Utc.timestamp_opt(secs, 0).single()?;
    (MIN_YEAR..=MAX_YEAR)
        .contains(&instant.year())
        .then_some(instant)
}

/// Resolve a raw epoch value of unknown unit to a UTC instant
pub fn normalize_timestamp(raw: i64) -> TrackerResult<DateTime<Utc>> {
    let guess = if raw > MILLIS_CUTOFF {
        EpochUnit::Millis
    } else {
        EpochUnit::Seconds
    };

    interpret(raw, guess)
        .or_else(|| interpret(raw, guess.opposite()))
        .ok_or(TrackerError::InvalidTimestamp(raw))
}

/// Normalize an optional source field, discarding invalid values with a warning
///
/// Invalid timestamps never fail the surrounding merge; the field is just
/// treated as unknown.
pub fn normalize_optional(raw: Option<i64>, field: &str, address: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match normalize_timestamp(raw) {
        Ok(instant) => Some(instant),
        Err(e) => {
            log::warn!("⚠️  Discarding {} for {}: {}", field, address, e);
            None
        }
    }
}

/// Current instant truncated to whole seconds, the resolution of stored token fields
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now)
}

/// Current instant truncated to milliseconds, the resolution of snapshot keys
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis()).single().unwrap_or(now)
}

/// Convert a configured window into a chrono span for instant arithmetic
///
/// Windows too large for chrono saturate at 100 years.
pub fn window(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Whether more than `window` has passed between `since` and `now`
pub fn elapsed_beyond(since: DateTime<Utc>, now: DateTime<Utc>, span: std::time::Duration) -> bool {
    now - since > window(span)
}
