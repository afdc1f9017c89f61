//! association-set provider client
//!
//! the ASP attests which deposits are approved and serves the two leaf
//! sets withdrawals prove against. it is eventually consistent and may lag
//! chain truth; reconciliation in the store handles the lag.

use alloy_primitives::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::account::DepositReviewRecord;
use crate::error::{Result, VeilError};

const SCOPE_HEADER: &str = "x-pool-scope";
const LABELS_HEADER: &str = "x-labels";

#[derive(Clone)]
pub struct AspClient {
    base_url: String,
    client: Client,
}

/// static pool facts served by the ASP
#[derive(Clone, Debug, Deserialize)]
pub struct PoolInfoResponse {
    pub chain_id: u64,
    pub scope: U256,
    pub vetting_fee_bps: U256,
    pub minimum_deposit_amount: U256,
}

/// both merkle roots as the ASP currently knows them
#[derive(Clone, Debug, Deserialize)]
pub struct MtRootsResponse {
    pub state_root: U256,
    pub asp_root: U256,
}

/// full leaf sets for witness assembly
#[derive(Clone, Debug, Deserialize)]
pub struct MtLeavesResponse {
    /// every commitment in the state tree, in insertion order
    pub state_tree_leaves: Vec<U256>,
    /// every approved label, in insertion order
    pub asp_leaves: Vec<U256>,
}

impl AspClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        headers: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self.client.get(format!("{}/{}", self.base_url, path));
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| VeilError::Asp(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VeilError::Asp(format!(
                "request failed: {}",
                response.status()
            )));
        }
        response.json().await.map_err(|e| VeilError::Asp(e.to_string()))
    }

    pub async fn pool_info(&self, chain_id: u64, scope: U256) -> Result<PoolInfoResponse> {
        self.get(
            &format!("{chain_id}/public/pool-info"),
            &[(SCOPE_HEADER, scope.to_string())],
        )
        .await
    }

    pub async fn mt_roots(&self, chain_id: u64, scope: U256) -> Result<MtRootsResponse> {
        self.get(
            &format!("{chain_id}/public/mt-roots"),
            &[(SCOPE_HEADER, scope.to_string())],
        )
        .await
    }

    pub async fn mt_leaves(&self, chain_id: u64, scope: U256) -> Result<MtLeavesResponse> {
        self.get(
            &format!("{chain_id}/public/mt-leaves"),
            &[(SCOPE_HEADER, scope.to_string())],
        )
        .await
    }

    /// per-label review records for the account's positions
    pub async fn deposits_by_label(
        &self,
        chain_id: u64,
        scope: U256,
        labels: &[U256],
    ) -> Result<Vec<DepositReviewRecord>> {
        let joined = labels
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.get(
            &format!("{chain_id}/private/deposits/{scope}"),
            &[(LABELS_HEADER, joined)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ReviewStatus;

    #[test]
    fn review_records_deserialize() {
        let raw = r#"[
            {"label": "0x2a", "status": "Approved", "timestamp": 1700000123},
            {"label": "0x2b", "status": "Pending", "timestamp": null}
        ]"#;
        let records: Vec<DepositReviewRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records[0].status, ReviewStatus::Approved);
        assert_eq!(records[0].timestamp, Some(1_700_000_123));
        assert_eq!(records[1].status, ReviewStatus::Pending);
    }

    #[test]
    fn leaves_deserialize() {
        let raw = r#"{"state_tree_leaves": ["0x1", "0x2"], "asp_leaves": ["0x2a"]}"#;
        let leaves: MtLeavesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(leaves.state_tree_leaves.len(), 2);
        assert_eq!(leaves.asp_leaves[0], U256::from(42u64));
    }
}
