//! Error taxonomy for the tracker pipeline
//!
//! Only `Storage` failures abort an enrichment cycle. Everything else is
//! absorbed somewhere downstream: connector errors degrade a single source,
//! bad timestamps are discarded, illegal transitions and duplicate events are
//! logged and ignored, out-of-range scores are clamped.

use super::types::{BondingCurveStatus, SourceKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transient source failure (timeout, 5xx, 429). Retried with backoff.
    #[error("{kind} connector unavailable: {reason}")]
    ConnectorUnavailable { kind: SourceKind, reason: String },

    /// Source answered but the payload could not be used. Not retried.
    #[error("malformed {kind} response: {reason}")]
    MalformedResponse { kind: SourceKind, reason: String },

    #[error("invalid timestamp: {0} is outside 2020-2030 as seconds and as milliseconds")]
    InvalidTimestamp(i64),

    #[error("illegal bonding-curve transition {from} -> {to}")]
    IllegalStateTransition {
        from: BondingCurveStatus,
        to: BondingCurveStatus,
    },

    #[error("duplicate balance change event: {0}")]
    DuplicateEvent(String),

    #[error("score out of range: {0}")]
    ScoreOutOfRange(f64),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// Whether a retry policy should try the call again
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::ConnectorUnavailable { .. })
    }

    /// Map a reqwest failure onto the taxonomy for the given source
    pub fn from_http(kind: SourceKind, err: reqwest::Error) -> Self {
        if err.is_decode() {
            TrackerError::MalformedResponse {
                kind,
                reason: err.to_string(),
            }
        } else {
            TrackerError::ConnectorUnavailable {
                kind,
                reason: err.to_string(),
            }
        }
    }

    /// Map a non-success HTTP status onto the taxonomy
    ///
    /// 429 and 5xx are transient, every other status is treated as a bad
    /// request for this address and not retried.
    pub fn from_status(kind: SourceKind, status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            TrackerError::ConnectorUnavailable {
                kind,
                reason: format!("HTTP {}", status),
            }
        } else {
            TrackerError::MalformedResponse {
                kind,
                reason: format!("HTTP {}", status),
            }
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let unavailable = TrackerError::ConnectorUnavailable {
            kind: SourceKind::DexAggregator,
            reason: "timeout".to_string(),
        };
        assert!(unavailable.is_transient());

        let malformed = TrackerError::MalformedResponse {
            kind: SourceKind::DexAggregator,
            reason: "missing pairs".to_string(),
        };
        assert!(!malformed.is_transient());
        assert!(!TrackerError::InvalidTimestamp(5).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        let err = TrackerError::from_status(SourceKind::RiskScanner, reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert!(err.is_transient());

        let err = TrackerError::from_status(SourceKind::RiskScanner, reqwest::StatusCode::BAD_GATEWAY);
        assert!(err.is_transient());

        let err = TrackerError::from_status(SourceKind::RiskScanner, reqwest::StatusCode::NOT_FOUND);
        assert!(!err.is_transient());
        assert!(err.to_string().contains("risk_scanner"));
    }
}
