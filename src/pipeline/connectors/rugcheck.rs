//! rugcheck.xyz risk-scanner connector
//!
//! Endpoint: https://api.rugcheck.xyz/v1/tokens/{mint}/report
//!
//! The report schema drifts often, so it is read as a `serde_json::Value`
//! and picked apart here. `score_normalised` is a risk score (higher =
//! riskier); it is inverted into a safety verdict before leaving this module.

use super::{lenient_f64, Connector, RiskObservation, SourceGate};
use crate::pipeline::error::{TrackerError, TrackerResult};
use crate::pipeline::types::{HolderDistribution, SourceKind};
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.rugcheck.xyz";

/// An authority field that is present and null has been revoked
fn authority_revoked(report: &Value, key: &str) -> Option<bool> {
    match report.get(key)? {
        Value::Null => Some(true),
        Value::String(s) => Some(s.is_empty()),
        _ => None,
    }
}

fn first_str(report: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let mut node = report;
        for key in path.iter() {
            node = node.get(key)?;
        }
        node.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
    })
}

/// Convert a rugcheck report into a risk observation
pub fn observation_from_report(report: &Value) -> TrackerResult<RiskObservation> {
    if !report.is_object() {
        return Err(TrackerError::MalformedResponse {
            kind: SourceKind::RiskScanner,
            reason: "report is not an object".to_string(),
        });
    }

    let risk_score = report
        .get("score_normalised")
        .or_else(|| report.get("scoreNormalised"))
        .and_then(lenient_f64);
    let safety_score = risk_score.map(|r| (100.0 - r).clamp(0.0, 100.0));

    let holder_pcts: Vec<f64> = report
        .get("topHolders")
        .and_then(Value::as_array)
        .map(|holders| {
            holders
                .iter()
                .filter_map(|h| h.get("pct").and_then(lenient_f64))
                .collect()
        })
        .unwrap_or_default();

    let distribution = if holder_pcts.is_empty() {
        HolderDistribution::default()
    } else {
        let mut sorted = holder_pcts;
        sorted.sort_by(|a, b| b.total_cmp(a));
        HolderDistribution {
            top_holder_pct: sorted.first().copied(),
            top10_pct: Some(sorted.iter().take(10).sum::<f64>().min(100.0)),
        }
    };

    // Best lock percentage across the token's markets
    let lp_locked_pct = report
        .get("markets")
        .and_then(Value::as_array)
        .and_then(|markets| {
            markets
                .iter()
                .filter_map(|m| m.get("lp").and_then(|lp| lp.get("lpLockedPct")).and_then(lenient_f64))
                .max_by(|a, b| a.total_cmp(b))
        });

    let decimals = report
        .get("token")
        .and_then(|t| t.get("decimals"))
        .and_then(Value::as_u64)
        .and_then(|d| u8::try_from(d).ok());

    let supply = report
        .get("token")
        .and_then(|t| t.get("supply"))
        .and_then(lenient_f64)
        .map(|raw| raw / 10f64.powi(decimals.unwrap_or(0) as i32));

    Ok(RiskObservation {
        symbol: first_str(report, &[&["tokenMeta", "symbol"], &["fileMeta", "symbol"]]),
        name: first_str(report, &[&["tokenMeta", "name"], &["fileMeta", "name"]]),
        decimals,
        safety_score,
        rugged: report.get("rugged").and_then(Value::as_bool),
        mint_authority_revoked: authority_revoked(report, "mintAuthority"),
        freeze_authority_revoked: authority_revoked(report, "freezeAuthority"),
        lp_locked_pct,
        holder_count: report.get("totalHolders").and_then(Value::as_u64),
        distribution,
        total_liquidity_usd: report.get("totalMarketLiquidity").and_then(lenient_f64),
        supply,
    })
}

pub struct RugCheckConnector {
    client: reqwest::Client,
    base_url: String,
    gate: SourceGate,
}

impl RugCheckConnector {
    pub fn new(client: reqwest::Client, gate: SourceGate) -> Self {
        Self::with_base_url(client, gate, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, gate: SourceGate, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gate,
        }
    }

    async fn fetch_report(&self, mint: &str) -> TrackerResult<Option<Value>> {
        let url = format!("{}/v1/tokens/{}/report", self.base_url, mint);
        let kind = SourceKind::RiskScanner;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TrackerError::from_status(kind, response.status()));
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| TrackerError::from_http(kind, e))
    }
}

#[async_trait]
impl Connector for RugCheckConnector {
    type Output = RiskObservation;

    fn kind(&self) -> SourceKind {
        SourceKind::RiskScanner
    }

    async fn fetch(&self, address: &str) -> TrackerResult<Option<RiskObservation>> {
        match self.gate.call(|| self.fetch_report(address)).await? {
            Some(report) => observation_from_report(&report).map(Some),
            None => Ok(None),
        }
    }
}
