//! account session and state store
//!
//! one session per seed. the session owns the master keys, the position
//! index and the per-scope deposit counters; dropping it wipes the keys
//! (zeroized) and the index with them. this replaces process-wide caches
//! keyed by rpc-url/seed: no state survives a seed switch.
//!
//! mutation discipline: full replays are serialized through a gate (two
//! overlapping replays would interleave chain appends), local optimistic
//! appends take the write lock briefly, and chain-confirmed data always
//! wins over optimistic data at the next successful load.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::account::{DepositReviewRecord, HistoryEntry, PoolAccount, RagequitInfo, ReviewStatus};
use crate::commitment::{Commitment, WithdrawalRequest};
use crate::config::PoolDescriptor;
use crate::error::{Result, VeilError};
use crate::events::{DepositEvent, EventSource, RetryPolicy};
use crate::replay;
use crate::secrets::{DepositSecrets, MasterKeys, SpendSecrets};
use crate::witness::{self, WithdrawalWitness};

/// partition key: one logical pool per (chain, scope)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainScope {
    pub chain_id: u64,
    pub scope: U256,
}

impl ChainScope {
    pub fn new(chain_id: u64, scope: U256) -> Self {
        Self { chain_id, scope }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.chain_id, self.scope)
    }
}

/// in-memory index of all positions, rebuilt wholesale by replay and
/// patched in place by local appends
#[derive(Debug, Default, Clone)]
pub struct AccountIndex {
    positions: HashMap<ChainScope, Vec<PoolAccount>>,
    /// per-scope monotonic deposit counters; never re-derived from the
    /// positions array length so a transient local/chain divergence cannot
    /// reuse an index
    deposit_counters: HashMap<ChainScope, u64>,
}

impl AccountIndex {
    pub fn positions(&self, key: ChainScope) -> &[PoolAccount] {
        self.positions.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn positions_for_chain(&self, chain_id: u64) -> Vec<&PoolAccount> {
        self.positions
            .iter()
            .filter(|(key, _)| key.chain_id == chain_id)
            .flat_map(|(_, positions)| positions.iter())
            .collect()
    }

    pub fn scopes(&self) -> impl Iterator<Item = ChainScope> + '_ {
        self.positions.keys().copied()
    }

    fn position_by_label_mut(&mut self, key: ChainScope, label: U256) -> Option<&mut PoolAccount> {
        self.positions
            .get_mut(&key)?
            .iter_mut()
            .find(|p| p.label == label)
    }
}

/// outcome of one full load
#[derive(Debug, Default)]
pub struct LoadReport {
    /// scopes replaced with chain truth
    pub loaded: Vec<ChainScope>,
    /// scopes left untouched because their replay failed, with the reason;
    /// distinguishes "no positions" from "couldn't load positions"
    pub stale: Vec<(ChainScope, String)>,
}

/// single logical owner of one seed's account state
pub struct AccountSession {
    keys: Arc<MasterKeys>,
    source: Arc<dyn EventSource>,
    policy: RetryPolicy,
    index: RwLock<AccountIndex>,
    /// serializes full replays; overlapping replays would corrupt the
    /// children ordering invariant
    load_gate: Mutex<()>,
    /// reconciliation ticks that land while one is in flight are skipped
    reconcile_gate: Mutex<()>,
}

impl AccountSession {
    /// start a session from a seed phrase
    pub fn login(
        phrase: &str,
        source: Arc<dyn EventSource>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let keys = MasterKeys::from_phrase(phrase)?;
        Ok(Self {
            keys: Arc::new(keys),
            source,
            policy,
            index: RwLock::new(AccountIndex::default()),
            load_gate: Mutex::new(()),
            reconcile_gate: Mutex::new(()),
        })
    }

    /// full replay of the given pools; idempotent, safe to call
    /// concurrently with itself (calls are queued, never interleaved)
    pub async fn load(&self, pools: &[PoolDescriptor]) -> Result<LoadReport> {
        for pool in pools {
            pool.validate()?;
        }

        let _gate = self.load_gate.lock().await;
        let outcome = replay::reconstruct(
            Arc::clone(&self.keys),
            pools,
            Arc::clone(&self.source),
            self.policy,
        )
        .await;

        let mut report = LoadReport::default();
        let mut guard = self.index.write().await;
        let index = &mut *guard;
        for (key, fresh) in outcome.positions {
            let merged = merge_positions(index.positions.remove(&key), fresh);
            let counter = index.deposit_counters.entry(key).or_insert(0);
            *counter = (*counter).max(merged.len() as u64);
            index.positions.insert(key, merged);
            report.loaded.push(key);
        }
        for (key, err) in outcome.stale {
            report.stale.push((key, err.to_string()));
        }

        info!(
            "account load: {} scopes refreshed, {} stale",
            report.loaded.len(),
            report.stale.len()
        );
        Ok(report)
    }

    /// next deposit index and the secrets derived for it; the counter only
    /// advances once the deposit is confirmed via [`Self::append_deposit`]
    pub async fn next_deposit_secrets(&self, pool: &PoolDescriptor) -> (u64, DepositSecrets) {
        let key = ChainScope::new(pool.chain_id, pool.scope);
        let index = *self
            .index
            .read()
            .await
            .deposit_counters
            .get(&key)
            .unwrap_or(&0);
        (index, self.keys.deposit_secrets(pool.scope, index))
    }

    /// record a locally confirmed deposit (optimistic; overwritten by the
    /// next successful load)
    pub async fn append_deposit(
        &self,
        pool: &PoolDescriptor,
        event: &DepositEvent,
    ) -> Result<PoolAccount> {
        pool.validate()?;
        let key = ChainScope::new(pool.chain_id, pool.scope);
        let mut index = self.index.write().await;

        let counter = *index.deposit_counters.get(&key).unwrap_or(&0);
        let secrets = self.keys.deposit_secrets(pool.scope, counter);
        if secrets.precommitment != event.precommitment {
            return Err(VeilError::CommitmentMismatch {
                onchain: event.precommitment,
                derived: secrets.precommitment,
            });
        }
        if index.positions(key).iter().any(|p| p.label == event.label) {
            return Err(VeilError::DuplicateLabel {
                scope: pool.scope,
                label: event.label,
            });
        }

        let deposit = Commitment::compute(
            event.value,
            event.label,
            secrets.nullifier,
            secrets.secret,
            event.block_number,
            event.tx_hash,
        );
        let position = PoolAccount::from_deposit(pool.chain_id, pool.scope, counter, deposit);
        index.positions.entry(key).or_default().push(position.clone());
        index.deposit_counters.insert(key, counter + 1);
        debug!("appended deposit {} to {}", event.label, key);
        Ok(position)
    }

    /// record a locally confirmed withdrawal against the position whose
    /// frontier is `parent_hash`
    #[allow(clippy::too_many_arguments)]
    pub async fn append_withdrawal(
        &self,
        chain_id: u64,
        scope: U256,
        parent_hash: U256,
        secrets: SpendSecrets,
        child_value: U256,
        block_number: u64,
        tx_hash: B256,
    ) -> Result<PoolAccount> {
        let key = ChainScope::new(chain_id, scope);
        let mut index = self.index.write().await;
        let positions = index
            .positions
            .get_mut(&key)
            .ok_or(VeilError::UnknownParent(parent_hash))?;
        let position = positions
            .iter_mut()
            .find(|p| p.last_commitment().hash == parent_hash)
            .ok_or(VeilError::UnknownParent(parent_hash))?;

        let child = Commitment::compute(
            child_value,
            position.label,
            secrets.nullifier,
            secrets.secret,
            block_number,
            tx_hash,
        );
        position.append_withdrawal(parent_hash, child)?;
        debug!("appended withdrawal to {} in {}", position.label, key);
        Ok(position.clone())
    }

    /// record a locally confirmed ragequit
    pub async fn append_ragequit(
        &self,
        chain_id: u64,
        scope: U256,
        label: U256,
        event: RagequitInfo,
    ) -> Result<PoolAccount> {
        let key = ChainScope::new(chain_id, scope);
        let mut index = self.index.write().await;
        let position = index
            .position_by_label_mut(key, label)
            .ok_or(VeilError::UnknownLabel(label))?;
        position.append_ragequit(event)?;
        debug!("appended ragequit to {} in {}", label, key);
        Ok(position.clone())
    }

    /// fold association-set review records into the scope's positions;
    /// returns false when a previous tick is still in flight (skipped)
    pub async fn reconcile_reviews(
        &self,
        chain_id: u64,
        scope: U256,
        records: &[DepositReviewRecord],
        asp_leaves: &[U256],
    ) -> Result<bool> {
        let Ok(_gate) = self.reconcile_gate.try_lock() else {
            debug!("reconciliation already in flight, skipping tick");
            return Ok(false);
        };

        let key = ChainScope::new(chain_id, scope);
        let leaf_set: HashSet<U256> = asp_leaves.iter().copied().collect();
        let mut index = self.index.write().await;
        let Some(positions) = index.positions.get_mut(&key) else {
            return Ok(true);
        };
        for position in positions.iter_mut() {
            let Some(record) = records.iter().find(|r| r.label == position.label) else {
                continue;
            };
            position.apply_review(record.status, leaf_set.contains(&position.label));
            if position.deposit.timestamp.is_none() {
                position.deposit.timestamp = record.timestamp;
            }
        }
        Ok(true)
    }

    /// positions of one pool, cloned out of the index
    pub async fn select_by_chain_scope(&self, chain_id: u64, scope: U256) -> Vec<PoolAccount> {
        self.index
            .read()
            .await
            .positions(ChainScope::new(chain_id, scope))
            .to_vec()
    }

    /// positions currently usable as a withdrawal source for the pool
    pub async fn spendable_positions(&self, chain_id: u64, scope: U256) -> Vec<PoolAccount> {
        self.index
            .read()
            .await
            .positions(ChainScope::new(chain_id, scope))
            .iter()
            .filter(|p| p.is_spendable())
            .cloned()
            .collect()
    }

    /// sum of spendable balances in the pool
    pub async fn spendable_total(&self, chain_id: u64, scope: U256) -> U256 {
        self.fold_balances(chain_id, scope, |p| p.ragequit.is_none()).await
    }

    /// sum of balances still awaiting association-set approval
    pub async fn pending_total(&self, chain_id: u64, scope: U256) -> U256 {
        self.fold_balances(chain_id, scope, |p| {
            p.review_status == ReviewStatus::Pending
        })
        .await
    }

    async fn fold_balances<F>(&self, chain_id: u64, scope: U256, keep: F) -> U256
    where
        F: Fn(&PoolAccount) -> bool,
    {
        self.index
            .read()
            .await
            .positions(ChainScope::new(chain_id, scope))
            .iter()
            .filter(|p| keep(p))
            .fold(U256::ZERO, |acc, p| acc + p.balance())
    }

    /// activity feed for one chain, newest first
    pub async fn history(&self, chain_id: u64) -> Vec<HistoryEntry> {
        let index = self.index.read().await;
        let mut entries: Vec<HistoryEntry> = index
            .positions_for_chain(chain_id)
            .into_iter()
            .flat_map(|p| p.history_entries())
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// assemble a withdrawal witness for the position with `label`;
    /// recomputed fresh on every call (never cached)
    #[allow(clippy::too_many_arguments)]
    pub async fn withdrawal_witness(
        &self,
        chain_id: u64,
        scope: U256,
        label: U256,
        amount: U256,
        state_leaves: &[U256],
        asp_leaves: &[U256],
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalWitness> {
        let index = self.index.read().await;
        let position = index
            .positions(ChainScope::new(chain_id, scope))
            .iter()
            .find(|p| p.label == label)
            .ok_or(VeilError::UnknownLabel(label))?;
        witness::build_withdrawal_witness(
            &self.keys,
            position,
            amount,
            state_leaves,
            asp_leaves,
            request,
        )
    }

    /// assemble a ragequit witness for the position with `label`
    pub async fn ragequit_witness(
        &self,
        chain_id: u64,
        scope: U256,
        label: U256,
    ) -> Result<crate::witness::RagequitWitness> {
        let index = self.index.read().await;
        let position = index
            .positions(ChainScope::new(chain_id, scope))
            .iter()
            .find(|p| p.label == label)
            .ok_or(VeilError::UnknownLabel(label))?;
        witness::build_ragequit_witness(position)
    }

    /// snapshot of the whole index
    pub async fn snapshot(&self) -> AccountIndex {
        self.index.read().await.clone()
    }
}

/// chain-confirmed data wins over locally-optimistic data; review state is
/// not chain data, so the previous (possibly further advanced) status is
/// carried forward where monotonicity allows
fn merge_positions(previous: Option<Vec<PoolAccount>>, fresh: Vec<PoolAccount>) -> Vec<PoolAccount> {
    let Some(previous) = previous else {
        return fresh;
    };
    fresh
        .into_iter()
        .map(|mut position| {
            if let Some(old) = previous.iter().find(|p| p.label == position.label) {
                if position.ragequit.is_none()
                    && position.review_status.can_advance_to(old.review_status)
                {
                    position.review_status = old.review_status;
                    position.in_asp_set = old.in_asp_set;
                }
            }
            position
        })
        .collect()
}
