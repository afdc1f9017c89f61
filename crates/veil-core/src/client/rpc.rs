//! JSON-RPC event source

use alloy_primitives::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::PoolDescriptor;
use crate::error::{Result, VeilError};
use crate::events::{DepositEvent, EventSource, RagequitEvent, WithdrawalEvent};

#[derive(Clone)]
pub struct RpcEventSource {
    url: String,
    client: Client,
}

impl RpcEventSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "veil",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VeilError::EventSource(e.to_string()))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| VeilError::EventSource(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(VeilError::EventSource(format!(
                "rpc error {}: {}",
                error.code, error.message
            )));
        }

        let result = body
            .result
            .ok_or_else(|| VeilError::EventSource("no result in response".into()))?;
        serde_json::from_value(result).map_err(|e| VeilError::EventSource(e.to_string()))
    }

    /// scope as reported by the deployed pool contract; used to verify a
    /// descriptor before trusting it
    pub async fn pool_scope(&self, pool: &PoolDescriptor) -> Result<U256> {
        self.call("pool_getScope", vec![json!(pool.pool_address)]).await
    }

    pub async fn pool_deployment_block(&self, pool: &PoolDescriptor) -> Result<u64> {
        self.call("pool_getDeploymentBlock", vec![json!(pool.pool_address)])
            .await
    }
}

#[async_trait::async_trait]
impl EventSource for RpcEventSource {
    async fn deposit_events(&self, pool: &PoolDescriptor) -> Result<Vec<DepositEvent>> {
        self.call(
            "pool_getDepositEvents",
            vec![json!(pool.pool_address), json!(pool.deployment_block)],
        )
        .await
    }

    async fn withdrawal_events(
        &self,
        pool: &PoolDescriptor,
        spent_nullifier_hash: U256,
    ) -> Result<Vec<WithdrawalEvent>> {
        self.call(
            "pool_getWithdrawalEvents",
            vec![json!(pool.pool_address), json!(spent_nullifier_hash)],
        )
        .await
    }

    async fn ragequit_events(
        &self,
        pool: &PoolDescriptor,
        label: U256,
    ) -> Result<Vec<RagequitEvent>> {
        self.call(
            "pool_getRagequitEvents",
            vec![json!(pool.pool_address), json!(label)],
        )
        .await
    }

    async fn block_timestamp(&self, _pool: &PoolDescriptor, block_number: u64) -> Result<u64> {
        self.call("chain_getBlockTimestamp", vec![json!(block_number)])
            .await
    }
}

#[derive(serde::Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(serde::Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;

    use super::*;

    #[test]
    fn events_deserialize_from_rpc_json() {
        let raw = json!({
            "precommitment": "0x1234",
            "label": "0x2a",
            "value": "0xde0b6b3a7640000",
            "block_number": 10,
            "tx_hash": B256::repeat_byte(1),
        });
        let event: DepositEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.label, U256::from(42u64));
        assert_eq!(event.value, U256::from(1_000_000_000_000_000_000u64));
    }
}
