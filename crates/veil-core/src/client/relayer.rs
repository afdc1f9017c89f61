//! relayer client
//!
//! the relayer submits the assembled withdrawal on the user's behalf so the
//! recipient address never signs a transaction. fees are quoted per
//! withdrawal and the quote's fee commitment rides along with the relay
//! request.

use alloy_primitives::{Address, B256, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::commitment::WithdrawalRequest;
use crate::error::{Result, VeilError};
use crate::prover::Proof;

#[derive(Clone)]
pub struct RelayerClient {
    base_url: String,
    client: Client,
}

/// withdrawal parameters exactly as the entry point hashes them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayPayload {
    pub processor: Address,
    pub data: Vec<U256>,
}

impl From<&WithdrawalRequest> for RelayPayload {
    fn from(request: &WithdrawalRequest) -> Self {
        Self {
            processor: request.processor,
            data: request.relay_data(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayRequestBody {
    pub withdrawal: RelayPayload,
    pub proof: Proof,
    pub public_signals: Vec<U256>,
    pub scope: U256,
    pub chain_id: u64,
    pub fee_commitment: Option<U256>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
}

/// standing fee parameters of a relayer
#[derive(Clone, Debug, Deserialize)]
pub struct RelayerFees {
    pub relayer_address: Address,
    pub fee_bps: U256,
}

/// per-withdrawal quote; expires, so witnesses built against it are
/// rebuilt on refresh
#[derive(Clone, Debug, Deserialize)]
pub struct FeeQuote {
    pub fee_bps: U256,
    pub fee_commitment: U256,
    pub expires_at: Option<u64>,
}

#[derive(Serialize)]
struct QuoteRequestBody {
    amount: U256,
    asset: Address,
    recipient: Address,
}

impl RelayerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VeilError::Relayer("relayer offline".into()));
        }
        Ok(())
    }

    pub async fn fees(&self, asset: Address) -> Result<RelayerFees> {
        let response = self
            .client
            .get(format!("{}/details", self.base_url))
            .query(&[("assetAddress", asset.to_string())])
            .send()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VeilError::Relayer(format!(
                "fee request failed: {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))
    }

    pub async fn quote(
        &self,
        amount: U256,
        asset: Address,
        recipient: Address,
    ) -> Result<FeeQuote> {
        let response = self
            .client
            .post(format!("{}/quote", self.base_url))
            .json(&QuoteRequestBody {
                amount,
                asset,
                recipient,
            })
            .send()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VeilError::Relayer(format!(
                "quote request failed: {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))
    }

    /// submit the withdrawal; a response without a tx hash is an error even
    /// when the relayer reports success
    pub async fn relay(&self, body: &RelayRequestBody) -> Result<B256> {
        let response = self
            .client
            .post(format!("{}/relay", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VeilError::Relayer(format!(
                "relay request failed: {}",
                response.status()
            )));
        }
        let relayed: RelayResponse = response
            .json()
            .await
            .map_err(|e| VeilError::Relayer(e.to_string()))?;
        if !relayed.success {
            return Err(VeilError::Relayer(
                relayed.error.unwrap_or_else(|| "relay failed".into()),
            ));
        }
        relayed
            .tx_hash
            .ok_or_else(|| VeilError::Relayer("relay response has no tx hash".into()))
    }
}
