//! Jupiter quote-API routing probe
//!
//! Asks for a small SOL -> token quote. A returned route means the token is
//! tradeable through the aggregator right now. "No route" is an answer, not
//! a failure.

use super::{lenient_f64, Connector, ProbeObservation, SourceGate};
use crate::pipeline::error::{TrackerError, TrackerResult};
use crate::pipeline::types::SourceKind;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://lite-api.jup.ag";
const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// 0.01 SOL in lamports
const PROBE_AMOUNT_LAMPORTS: u64 = 10_000_000;
const PROBE_SLIPPAGE_BPS: u32 = 500;

/// Error codes the quote API uses when there is simply no route
const NO_ROUTE_CODES: &[&str] = &[
    "COULD_NOT_FIND_ANY_ROUTE",
    "NO_ROUTES_FOUND",
    "TOKEN_NOT_TRADABLE",
    "ROUTE_PLAN_DOES_NOT_CONSUME_ALL_THE_AMOUNT",
];

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "outAmount", default)]
    pub out_amount: Option<String>,
    #[serde(rename = "priceImpactPct", default)]
    pub price_impact_pct: Option<serde_json::Value>,
    #[serde(rename = "routePlan", default)]
    pub route_plan: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QuoteError {
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

impl QuoteError {
    fn is_no_route(&self) -> bool {
        let code = self.error_code.as_deref().unwrap_or_default();
        let message = self.error.as_deref().unwrap_or_default();
        NO_ROUTE_CODES.iter().any(|c| code == *c || message.contains(c))
            || message.to_ascii_lowercase().contains("no route")
    }
}

impl QuoteResponse {
    pub fn into_observation(self) -> ProbeObservation {
        let out_amount = self
            .out_amount
            .as_deref()
            .and_then(|a| a.parse::<u64>().ok())
            .unwrap_or(0);

        ProbeObservation {
            routable: !self.route_plan.is_empty() && out_amount > 0,
            // API reports a fraction ("0.0123"), stored as percent
            price_impact_pct: self
                .price_impact_pct
                .as_ref()
                .and_then(lenient_f64)
                .map(|fraction| fraction * 100.0),
        }
    }
}

pub struct JupiterConnector {
    client: reqwest::Client,
    base_url: String,
    gate: SourceGate,
}

impl JupiterConnector {
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

    async fn probe(&self, mint: &str) -> TrackerResult<ProbeObservation> {
        let url = format!(
            "{}/swap/v1/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, WRAPPED_SOL_MINT, mint, PROBE_AMOUNT_LAMPORTS, PROBE_SLIPPAGE_BPS
        );
        let kind = SourceKind::LiquidityProbe;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<QuoteError>(&body) {
                Ok(err) if err.is_no_route() => Ok(ProbeObservation {
                    routable: false,
                    price_impact_pct: None,
                }),
                _ => Err(TrackerError::MalformedResponse {
                    kind,
                    reason: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
                }),
            };
        }
        if !status.is_success() {
            return Err(TrackerError::from_status(kind, status));
        }

        response
            .json::<QuoteResponse>()
            .await
            .map(QuoteResponse::into_observation)
            .map_err(|e| TrackerError::from_http(kind, e))
    }
}

#[async_trait]
impl Connector for JupiterConnector {
    type Output = ProbeObservation;

    fn kind(&self) -> SourceKind {
        SourceKind::LiquidityProbe
    }

    async fn fetch(&self, address: &str) -> TrackerResult<Option<ProbeObservation>> {
        if address == WRAPPED_SOL_MINT {
            return Ok(Some(ProbeObservation {
                routable: true,
                price_impact_pct: Some(0.0),
            }));
        }
        self.gate.call(|| self.probe(address)).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_with_route() {
        let quote: QuoteResponse = serde_json::from_value(serde_json::json!({
            "inputMint": WRAPPED_SOL_MINT,
            "outAmount": "123456789",
            "priceImpactPct": "0.0125",
            "routePlan": [ { "swapInfo": { "label": "Raydium" }, "percent": 100 } ]
        }))
        .unwrap();

        let obs = quote.into_observation();
        assert!(obs.routable);
        assert!((obs.price_impact_pct.unwrap() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_route_plan_not_routable() {
        let quote: QuoteResponse = serde_json::from_value(serde_json::json!({
            "outAmount": "0",
            "routePlan": []
        }))
        .unwrap();
        assert!(!quote.into_observation().routable);
    }

    #[test]
    fn test_no_route_error_detection() {
        let err: QuoteError = serde_json::from_str(
            r#"{"error":"Could not find any route","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#,
        )
        .unwrap();
        assert!(err.is_no_route());

        let err: QuoteError = serde_json::from_str(r#"{"error":"Invalid inputMint"}"#).unwrap();
        assert!(!err.is_no_route());
    }
}
