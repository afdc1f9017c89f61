//! proof input assembly
//!
//! packages a position's spendable commitment, the two merkle proofs
//! (state tree keyed by commitment hash, association-set tree keyed by
//! label), a fresh context and freshly derived spend secrets into the
//! numeric witness the proving engine consumes. no I/O here: leaf sets and
//! fee parameters come from the caller's collaborators.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::account::PoolAccount;
use crate::commitment::{withdrawal_context, WithdrawalRequest};
use crate::error::{Result, VeilError};
use crate::merkle::{MerkleProof, MerkleTree};
use crate::secrets::MasterKeys;
use crate::{ASP_TREE_DEPTH, STATE_TREE_DEPTH};

/// everything the withdrawal circuit takes as input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalWitness {
    pub withdrawal_amount: U256,
    pub state_proof: MerkleProof,
    pub asp_proof: MerkleProof,
    pub state_root: U256,
    pub asp_root: U256,
    pub state_tree_depth: u64,
    pub asp_tree_depth: u64,
    pub context: U256,
    pub new_nullifier: U256,
    pub new_secret: U256,
}

/// preimage of the spendable commitment, opened for the ragequit circuit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagequitWitness {
    pub value: U256,
    pub label: U256,
    pub nullifier: U256,
    pub secret: U256,
}

/// assemble a withdrawal witness
///
/// recomputed fresh for every attempt: the context binds recipient and fee,
/// which change between quote refreshes
pub fn build_withdrawal_witness(
    keys: &MasterKeys,
    position: &PoolAccount,
    amount: U256,
    state_leaves: &[U256],
    asp_leaves: &[U256],
    request: &WithdrawalRequest,
) -> Result<WithdrawalWitness> {
    if position.ragequit.is_some() {
        return Err(VeilError::AlreadyExited(position.label));
    }
    let balance = position.balance();
    if amount > balance {
        return Err(VeilError::AmountExceedsBalance { amount, balance });
    }
    if state_leaves.is_empty() {
        return Err(VeilError::MissingLeaves("state tree leaves unavailable"));
    }
    if asp_leaves.is_empty() {
        return Err(VeilError::MissingLeaves("association set leaves unavailable"));
    }

    let commitment = position.last_commitment();
    let state_tree = MerkleTree::from_leaves(state_leaves, STATE_TREE_DEPTH)?;
    let state_proof = state_tree.prove(commitment.hash)?;
    let asp_tree = MerkleTree::from_leaves(asp_leaves, ASP_TREE_DEPTH)?;
    let asp_proof = asp_tree.prove(position.label)?;

    let context = withdrawal_context(request, position.scope);
    let spend = keys.spend_secrets(commitment);

    Ok(WithdrawalWitness {
        withdrawal_amount: amount,
        state_root: state_proof.root,
        asp_root: asp_proof.root,
        state_proof,
        asp_proof,
        state_tree_depth: STATE_TREE_DEPTH as u64,
        asp_tree_depth: ASP_TREE_DEPTH as u64,
        context,
        new_nullifier: spend.nullifier,
        new_secret: spend.secret,
    })
}

/// open the spendable commitment for the ragequit circuit
pub fn build_ragequit_witness(position: &PoolAccount) -> Result<RagequitWitness> {
    if position.ragequit.is_some() {
        return Err(VeilError::AlreadyExited(position.label));
    }
    let commitment = position.last_commitment();
    Ok(RagequitWitness {
        value: commitment.value,
        label: commitment.label,
        nullifier: commitment.nullifier,
        secret: commitment.secret,
    })
}
