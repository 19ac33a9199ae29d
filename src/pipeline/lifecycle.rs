//! Bonding-curve state tracker
//!
//! ```text
//! created ──volume──▶ active ──complete──▶ completed ──pool──▶ migrated
//!    │                  │                      │
//!    └──────────────────┴──── withdrawn / ─────┴──▶ terminated
//!                            unreachable
//! ```
//!
//! The guards observed in one merge cycle define a target state. The tracker
//! moves at most one step toward it per cycle, so evidence for two steps at
//! once (complete and pooled) takes two cycles to land on `migrated`.

use super::error::{TrackerError, TrackerResult};
use super::types::BondingCurveStatus;

/// Guard evidence gathered by the aggregator for one merge cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveSignals {
    /// Non-zero volume has been observed at some point
    pub volume_seen: bool,
    /// Launch platform's completion flag, `None` when it did not answer
    pub launch_complete: Option<bool>,
    /// A post-migration pool address is associated with the token
    pub pool_associated: bool,
    /// Platform reports the curve withdrawn, cancelled or banned
    pub withdrawn: bool,
    /// No source has answered for the unreachable window
    pub unreachable: bool,
}

impl CurveSignals {
    /// State the evidence points to, ignoring the one-step limit
    pub fn target(&self) -> BondingCurveStatus {
        if self.withdrawn || self.unreachable {
            BondingCurveStatus::Terminated
        } else if self.pool_associated {
            BondingCurveStatus::Migrated
        } else if self.launch_complete == Some(true) {
            BondingCurveStatus::Completed
        } else if self.volume_seen {
            BondingCurveStatus::Active
        } else {
            BondingCurveStatus::Created
        }
    }
}

/// Validate a single transition
pub fn transition(
    from: BondingCurveStatus,
    to: BondingCurveStatus,
) -> TrackerResult<BondingCurveStatus> {
    let legal = from == to
        || (to == BondingCurveStatus::Terminated && from.is_pre_migration())
        || from.next() == Some(to);

    if legal {
        Ok(to)
    } else {
        Err(TrackerError::IllegalStateTransition { from, to })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurveStateTracker;

impl CurveStateTracker {
    pub fn new() -> Self {
        Self
    }

    /// Next state for `current` given this cycle's signals
    ///
    /// Returns `Err(IllegalStateTransition)` when the evidence demands a
    /// move the state machine does not allow: leaving a final state, or the
    /// launch platform explicitly reporting an incomplete curve for a token
    /// already past completion. Missing evidence is never a reason to move
    /// backward; it just holds the current state.
    pub fn evaluate(
        &self,
        current: BondingCurveStatus,
        signals: &CurveSignals,
    ) -> TrackerResult<BondingCurveStatus> {
        let target = signals.target();
        if target == current {
            return Ok(current);
        }

        if current.is_final() {
            // Leftover launch-platform state after migration is expected
            if current == BondingCurveStatus::Migrated && target != BondingCurveStatus::Terminated {
                return Ok(current);
            }
            return transition(current, target);
        }

        if target == BondingCurveStatus::Terminated {
            return transition(current, target);
        }

        match (current.rank(), target.rank()) {
            (Some(now), Some(want)) if want > now => match current.next() {
                Some(step) => transition(current, step),
                None => Ok(current),
            },
            _ if signals.launch_complete == Some(false) && current == BondingCurveStatus::Completed => {
                transition(current, target)
            }
            _ => Ok(current),
        }
    }

    /// `evaluate`, logging and swallowing illegal transitions
    pub fn advance(&self, address: &str, current: BondingCurveStatus, signals: &CurveSignals) -> BondingCurveStatus {
        match self.evaluate(current, signals) {
            Ok(next) => {
                if next != current {
                    log::info!("🔄 {} bonding curve {} → {}", address, current, next);
                }
                next
            }
            Err(e) => {
                log::warn!("⚠️  {}: {} (keeping {})", address, e, current);
                current
            }
        }
    }
}
