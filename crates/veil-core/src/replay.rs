//! event ledger replay
//!
//! reconstructs every position belonging to a seed by walking on-chain
//! events: deposit events are matched against derived precommitments at
//! increasing indices, then each position's withdrawal chain is followed
//! nullifier-hash by nullifier-hash until the frontier has no spend or a
//! ragequit terminates it.
//!
//! replay is read-only and deterministic: running it twice against an
//! unchanged chain yields value-equal results. pools whose queries keep
//! failing are reported stale so the caller can keep its previous state
//! instead of flashing a zero balance.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::U256;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::account::PoolAccount;
use crate::commitment::{nullifier_hash, Commitment};
use crate::config::PoolDescriptor;
use crate::error::{Result, VeilError};
use crate::events::{fetch_with_retry, EventSource, RetryPolicy, WithdrawalEvent};
use crate::secrets::MasterKeys;
use crate::store::ChainScope;

/// result of replaying a set of pools
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// successfully reconstructed positions, keyed by chain + scope
    pub positions: HashMap<ChainScope, Vec<PoolAccount>>,
    /// pools whose replay failed after retries, with the failure reason;
    /// the caller keeps its previous state for these
    pub stale: Vec<(ChainScope, VeilError)>,
}

/// replay all pools concurrently (chain reads are read-only and
/// independent); account mutation stays with the caller
pub async fn reconstruct(
    keys: Arc<MasterKeys>,
    pools: &[PoolDescriptor],
    source: Arc<dyn EventSource>,
    policy: RetryPolicy,
) -> ReplayOutcome {
    let mut tasks = JoinSet::new();
    for pool in pools {
        let keys = Arc::clone(&keys);
        let source = Arc::clone(&source);
        let pool = pool.clone();
        tasks.spawn(async move {
            let key = ChainScope::new(pool.chain_id, pool.scope);
            let result = replay_pool(&keys, &pool, source.as_ref(), policy).await;
            (key, result)
        });
    }

    let mut outcome = ReplayOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        let (key, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!("replay task panicked: {e}");
                continue;
            }
        };
        match result {
            Ok(positions) => {
                debug!("replayed {}: {} positions", key, positions.len());
                outcome.positions.insert(key, positions);
            }
            Err(err) => {
                warn!("replay of {} failed, keeping previous state: {}", key, err);
                outcome.stale.push((key, err));
            }
        }
    }
    info!(
        "replay finished: {} scopes ok, {} stale",
        outcome.positions.len(),
        outcome.stale.len()
    );
    outcome
}

/// reconstruct all positions of one pool
pub async fn replay_pool(
    keys: &MasterKeys,
    pool: &PoolDescriptor,
    source: &dyn EventSource,
    policy: RetryPolicy,
) -> Result<Vec<PoolAccount>> {
    pool.validate()?;

    let deposits = fetch_with_retry(policy, "deposit events", || source.deposit_events(pool)).await?;

    let mut positions = Vec::new();
    let mut timestamps = TimestampCache::default();

    // indices are assigned sequentially at deposit time, so the first index
    // with no matching precommitment ends the scan
    for index in 0u64.. {
        let secrets = keys.deposit_secrets(pool.scope, index);
        let Some(event) = deposits
            .iter()
            .find(|d| d.precommitment == secrets.precommitment)
        else {
            break;
        };

        let mut deposit = Commitment::compute(
            event.value,
            event.label,
            secrets.nullifier,
            secrets.secret,
            event.block_number,
            event.tx_hash,
        );
        deposit.timestamp = Some(timestamps.resolve(source, pool, event.block_number, policy).await?);

        let mut position = PoolAccount::from_deposit(pool.chain_id, pool.scope, index, deposit);
        follow_chain(keys, pool, source, policy, &mut position, &mut timestamps).await?;

        let rq_events =
            fetch_with_retry(policy, "ragequit events", || {
                source.ragequit_events(pool, position.label)
            })
            .await?;
        if let Some(event) = rq_events.iter().min_by_key(|e| e.block_number) {
            let timestamp = timestamps.resolve(source, pool, event.block_number, policy).await?;
            position.append_ragequit(crate::account::RagequitInfo {
                ragequitter: event.ragequitter,
                commitment: event.commitment,
                label: event.label,
                value: event.value,
                block_number: event.block_number,
                tx_hash: event.tx_hash,
                timestamp: Some(timestamp),
            })?;
        }

        positions.push(position);
    }

    Ok(positions)
}

/// advance the position's chain until no withdrawal spends the frontier
async fn follow_chain(
    keys: &MasterKeys,
    pool: &PoolDescriptor,
    source: &dyn EventSource,
    policy: RetryPolicy,
    position: &mut PoolAccount,
    timestamps: &mut TimestampCache,
) -> Result<()> {
    loop {
        let frontier = position.last_commitment().clone();
        let spent_hash = nullifier_hash(frontier.nullifier);

        let spends = fetch_with_retry(policy, "withdrawal events", || {
            source.withdrawal_events(pool, spent_hash)
        })
        .await?;

        let Some(spend) = select_spend(spent_hash, spends)? else {
            return Ok(());
        };

        let child_value =
            frontier
                .value
                .checked_sub(spend.withdrawn)
                .ok_or(VeilError::InvalidChildValue {
                    parent: frontier.value,
                    child: spend.withdrawn,
                })?;

        let secrets = keys.spend_secrets(&frontier);
        let mut child = Commitment::compute(
            child_value,
            frontier.label,
            secrets.nullifier,
            secrets.secret,
            spend.block_number,
            spend.tx_hash,
        );

        // the on-chain change commitment must equal the one we derive; a
        // mismatch means wrong secrets or corrupted events, and any proof
        // built on top of it would be unlinkable
        if child.hash != spend.new_commitment {
            return Err(VeilError::CommitmentMismatch {
                onchain: spend.new_commitment,
                derived: child.hash,
            });
        }

        child.timestamp = Some(timestamps.resolve(source, pool, spend.block_number, policy).await?);
        debug!(
            "label {}: appended child {} at block {}",
            position.label, child, spend.block_number
        );
        position.append_withdrawal(frontier.hash, child)?;
    }
}

/// a commitment can be spent exactly once; two distinct events at the same
/// frontier mean the reconstruction diverged from chain truth
fn select_spend(
    spent_hash: U256,
    mut spends: Vec<WithdrawalEvent>,
) -> Result<Option<WithdrawalEvent>> {
    spends.sort_by_key(|e| e.block_number);
    spends.dedup();
    match spends.len() {
        0 => Ok(None),
        1 => Ok(spends.pop()),
        _ => Err(VeilError::ChainForked(spent_hash)),
    }
}

#[derive(Default)]
struct TimestampCache {
    by_block: HashMap<u64, u64>,
}

impl TimestampCache {
    async fn resolve(
        &mut self,
        source: &dyn EventSource,
        pool: &PoolDescriptor,
        block_number: u64,
        policy: RetryPolicy,
    ) -> Result<u64> {
        if let Some(ts) = self.by_block.get(&block_number) {
            return Ok(*ts);
        }
        let ts = fetch_with_retry(policy, "block timestamp", || {
            source.block_timestamp(pool, block_number)
        })
        .await?;
        self.by_block.insert(block_number, ts);
        Ok(ts)
    }
}
