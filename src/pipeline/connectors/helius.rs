//! Helius enhanced-transactions balance feed
//!
//! Endpoint: https://api.helius.xyz/v0/addresses/{mint}/transactions?api-key=KEY
//!
//! Each parsed transaction carries per-account native (lamport) deltas and
//! token deltas. They are folded into one `BalanceLeg` per wallet per
//! signature; picking the representative leg and classifying it is the whale
//! detector's job.

use super::{Connector, BalanceLeg, SourceGate};
use crate::pipeline::error::{TrackerError, TrackerResult};
use crate::pipeline::types::SourceKind;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

const DEFAULT_BASE_URL: &str = "https://api.helius.xyz";
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancedTransaction {
    pub signature: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "feePayer", default)]
    pub fee_payer: Option<String>,
    #[serde(rename = "accountData", default)]
    pub account_data: Vec<AccountData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
    pub account: String,
    #[serde(rename = "nativeBalanceChange", default)]
    pub native_balance_change: i64,
    #[serde(rename = "tokenBalanceChanges", default)]
    pub token_balance_changes: Vec<TokenBalanceChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalanceChange {
    #[serde(rename = "userAccount")]
    pub user_account: String,
    pub mint: String,
    #[serde(rename = "rawTokenAmount")]
    pub raw_token_amount: RawTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTokenAmount {
    #[serde(rename = "tokenAmount")]
    pub token_amount: String,
    pub decimals: u32,
}

impl RawTokenAmount {
    fn ui_amount(&self) -> Option<f64> {
        let raw = self.token_amount.parse::<i128>().ok()?;
        Some(raw as f64 / 10f64.powi(self.decimals as i32))
    }
}

/// Fold one transaction into per-wallet legs for `mint`
///
/// Wallets with neither a `mint` delta nor a SOL delta are dropped.
/// Transactions without a block time are skipped.
pub fn legs_from_transaction(mint: &str, tx: &EnhancedTransaction) -> Vec<BalanceLeg> {
    let Some(block_time_raw) = tx.timestamp else {
        return Vec::new();
    };

    // wallet -> (token delta, SOL delta)
    let mut deltas: BTreeMap<&str, (f64, f64)> = BTreeMap::new();

    for account in &tx.account_data {
        if account.native_balance_change != 0 {
            deltas.entry(account.account.as_str()).or_default().1 +=
                account.native_balance_change as f64 / LAMPORTS_PER_SOL;
        }
        for change in account.token_balance_changes.iter().filter(|c| c.mint == mint) {
            if let Some(amount) = change.raw_token_amount.ui_amount() {
                deltas.entry(change.user_account.as_str()).or_default().0 += amount;
            }
        }
    }

    deltas
        .into_iter()
        .filter(|(_, (token, sol))| *token != 0.0 || *sol != 0.0)
        .map(|(wallet, (token, sol))| BalanceLeg {
            signature: tx.signature.clone(),
            wallet: wallet.to_string(),
            token_mint: (token != 0.0).then(|| mint.to_string()),
            token_amount: token,
            sol_amount: sol,
            block_time_raw,
            fee_payer: tx.fee_payer.as_deref() == Some(wallet),
        })
        .collect()
}

pub struct HeliusConnector {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    gate: SourceGate,
}

impl HeliusConnector {
    pub fn new(client: reqwest::Client, gate: SourceGate, api_key: &str) -> Self {
        Self::with_base_url(client, gate, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, gate: SourceGate, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            gate,
        }
    }

    async fn fetch_transactions(&self, address: &str) -> TrackerResult<Vec<EnhancedTransaction>> {
        let url = format!("{}/v0/addresses/{}/transactions", self.base_url, address);
        let kind = SourceKind::BalanceFeed;

        let response = self
            .client
            .get(&url)
            .query(&[("api-key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))?;

        if !response.status().is_success() {
            return Err(TrackerError::from_status(kind, response.status()));
        }

        response
            .json::<Vec<EnhancedTransaction>>()
            .await
            .map_err(|e| TrackerError::from_http(kind, e))
    }
}

#[async_trait]
impl Connector for HeliusConnector {
    type Output = Vec<BalanceLeg>;

    fn kind(&self) -> SourceKind {
        SourceKind::BalanceFeed
    }

    async fn fetch(&self, address: &str) -> TrackerResult<Option<Vec<BalanceLeg>>> {
        let transactions = self.gate.call(|| self.fetch_transactions(address)).await?;
        let legs: Vec<BalanceLeg> = transactions
            .iter()
            .flat_map(|tx| legs_from_transaction(address, tx))
            .collect();
        Ok(Some(legs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R";

    fn swap_fixture() -> EnhancedTransaction {
        serde_json::from_value(serde_json::json!({
            "signature": "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv",
            "timestamp": 1717000000,
            "type": "SWAP",
            "feePayer": "BuyerWallet1111",
            "accountData": [
                {
                    "account": "BuyerWallet1111",
                    "nativeBalanceChange": -2_000_000_000i64,
                    "tokenBalanceChanges": []
                },
                {
                    "account": "BuyerAta1111",
                    "nativeBalanceChange": 0,
                    "tokenBalanceChanges": [
                        {
                            "userAccount": "BuyerWallet1111",
                            "tokenAccount": "BuyerAta1111",
                            "mint": MINT,
                            "rawTokenAmount": { "tokenAmount": "15000000000000", "decimals": 6 }
                        }
                    ]
                },
                {
                    "account": "PoolVault1111",
                    "nativeBalanceChange": 2_000_000_000i64,
                    "tokenBalanceChanges": [
                        {
                            "userAccount": "PoolAuthority1111",
                            "tokenAccount": "PoolVault1111",
                            "mint": MINT,
                            "rawTokenAmount": { "tokenAmount": "-15000000000000", "decimals": 6 }
                        },
                        {
                            "userAccount": "PoolAuthority1111",
                            "tokenAccount": "OtherVault",
                            "mint": "SomeOtherMint",
                            "rawTokenAmount": { "tokenAmount": "5", "decimals": 0 }
                        }
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_swap_folds_into_wallet_legs() {
        let legs = legs_from_transaction(MINT, &swap_fixture());

        let buyer = legs.iter().find(|l| l.wallet == "BuyerWallet1111").unwrap();
        assert_eq!(buyer.token_amount, 15_000_000.0);
        assert_eq!(buyer.sol_amount, -2.0);
        assert_eq!(buyer.token_mint.as_deref(), Some(MINT));
        assert_eq!(buyer.block_time_raw, 1717000000);
        assert!(buyer.fee_payer);

        let pool = legs.iter().find(|l| l.wallet == "PoolAuthority1111").unwrap();
        assert_eq!(pool.token_amount, -15_000_000.0);
        assert_eq!(pool.sol_amount, 0.0);
        assert!(!pool.fee_payer);

        // Vault account only has a SOL delta
        let vault = legs.iter().find(|l| l.wallet == "PoolVault1111").unwrap();
        assert_eq!(vault.token_mint, None);
        assert_eq!(vault.sol_amount, 2.0);
    }

    #[test]
    fn test_missing_timestamp_skipped() {
        let mut tx = swap_fixture();
        tx.timestamp = None;
        assert!(legs_from_transaction(MINT, &tx).is_empty());
    }
}
