//! on-chain event types and the event-source collaborator
//!
//! the engine never talks to a chain directly: it consumes an [`EventSource`]
//! that answers read-only, idempotent queries. queries are retried with
//! exponential backoff and a hard per-request timeout; a pool whose queries
//! keep failing is reported stale, never emptied.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PoolDescriptor;
use crate::error::{Result, VeilError};

/// deposit recorded by the pool contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub precommitment: U256,
    pub label: U256,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// withdrawal recorded by the pool contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    /// nullifier hash of the commitment that was spent
    pub spent_nullifier_hash: U256,
    /// hash of the change commitment inserted into the state tree
    pub new_commitment: U256,
    /// amount withdrawn from the spent commitment
    pub withdrawn: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// emergency exit recorded by the pool contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagequitEvent {
    pub ragequitter: Address,
    pub commitment: U256,
    pub label: U256,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// read-only chain data collaborator
///
/// all queries must be idempotent: replay re-issues them freely
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// all deposit events of the pool since its deployment block
    async fn deposit_events(&self, pool: &PoolDescriptor) -> Result<Vec<DepositEvent>>;

    /// withdrawal events spending the given nullifier hash
    async fn withdrawal_events(
        &self,
        pool: &PoolDescriptor,
        spent_nullifier_hash: U256,
    ) -> Result<Vec<WithdrawalEvent>>;

    /// ragequit events for the given label
    async fn ragequit_events(
        &self,
        pool: &PoolDescriptor,
        label: U256,
    ) -> Result<Vec<RagequitEvent>>;

    /// timestamp of a block, in unix seconds
    async fn block_timestamp(&self, pool: &PoolDescriptor, block_number: u64) -> Result<u64>;
}

/// bounded retry with exponential backoff and a hard per-request timeout
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// run `op` under the policy; only retryable errors are retried
pub async fn fetch_with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = VeilError::EventSource(format!("{label}: no attempts made"));
    for attempt in 0..policy.max_attempts {
        match tokio::time::timeout(policy.request_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_retryable() => return Err(err),
            Ok(Err(err)) => {
                warn!("{} failed (attempt {}): {}", label, attempt + 1, err);
                last_err = err;
            }
            Err(_) => {
                warn!("{} timed out (attempt {})", label, attempt + 1);
                last_err = VeilError::EventSource(format!(
                    "{label}: timed out after {:?}",
                    policy.request_timeout
                ));
            }
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.base_delay * (1u32 << attempt)).await;
        }
    }
    Err(last_err)
}

/// poll `op` until it yields a value, e.g. waiting for a just-submitted
/// transaction's event to land in the source
pub async fn wait_for<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    fetch_with_retry(policy, label, || async {
        op().await?
            .ok_or_else(|| VeilError::EventSource(format!("{label}: event not yet available")))
    })
    .await
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = fetch_with_retry(policy(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VeilError::EventSource("flaky".into()))
            } else {
                Ok(42u32)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn integrity_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fetch_with_retry(policy(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(VeilError::ChainForked(U256::ZERO))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VeilError::ChainForked(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let err = fetch_with_retry(policy(), "test", || async {
            Err::<u32, _>(VeilError::EventSource("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VeilError::EventSource(_)));
    }

    #[tokio::test]
    async fn wait_for_polls_until_present() {
        let calls = AtomicU32::new(0);
        let out = wait_for(policy(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                Ok(None)
            } else {
                Ok(Some(7u32))
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
    }
}
