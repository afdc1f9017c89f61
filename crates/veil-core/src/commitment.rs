//! commitment and context hashing
//!
//! a commitment binds a value to secret ownership material; its hash is a
//! leaf in the pool's state tree. the context binds a withdrawal's
//! recipient/fee parameters to a scope so a proof cannot be replayed
//! against a different request.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{DOMAIN_COMMITMENT, DOMAIN_CONTEXT, DOMAIN_NULLIFIER_HASH, DOMAIN_PRECOMMITMENT};

/// map a digest into a 256-bit integer with the top byte cleared so the
/// result embeds in common snark scalar fields
pub(crate) fn digest_to_uint(digest: blake3::Hash) -> U256 {
    let mut bytes = *digest.as_bytes();
    bytes[0] = 0;
    U256::from_be_bytes(bytes)
}

fn hash_parts(domain: &[u8], parts: &[U256]) -> U256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(&part.to_be_bytes::<32>());
    }
    digest_to_uint(hasher.finalize())
}

/// state-tree leaf hash for a commitment
pub fn commitment_hash(value: U256, label: U256, nullifier: U256, secret: U256) -> U256 {
    hash_parts(DOMAIN_COMMITMENT, &[value, label, nullifier, secret])
}

/// hash submitted at deposit time, matched on-chain to assign the label
pub fn precommitment_hash(nullifier: U256, secret: U256) -> U256 {
    hash_parts(DOMAIN_PRECOMMITMENT, &[nullifier, secret])
}

/// revealing this hash marks the commitment as spent
pub fn nullifier_hash(nullifier: U256) -> U256 {
    hash_parts(DOMAIN_NULLIFIER_HASH, &[nullifier])
}

/// one link in a position's commitment chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub value: U256,
    pub label: U256,
    pub nullifier: U256,
    pub secret: U256,
    pub hash: U256,
    pub block_number: u64,
    pub tx_hash: B256,
    /// block timestamp, resolved lazily during replay
    pub timestamp: Option<u64>,
}

impl Commitment {
    pub fn compute(
        value: U256,
        label: U256,
        nullifier: U256,
        secret: U256,
        block_number: u64,
        tx_hash: B256,
    ) -> Self {
        Self {
            value,
            label,
            nullifier,
            secret,
            hash: commitment_hash(value, label, nullifier, secret),
            block_number,
            tx_hash,
            timestamp: None,
        }
    }

    pub fn nullifier_hash(&self) -> U256 {
        nullifier_hash(self.nullifier)
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // short form for logs: first 8 bytes of the leaf hash
        write!(f, "0x{}", hex::encode(&self.hash.to_be_bytes::<32>()[..8]))
    }
}

/// recipient/fee parameters of one withdrawal attempt
///
/// the relay data layout mirrors what the entry-point contract hashes:
/// (recipient, fee recipient, relay fee in basis points)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// entry-point contract that processes the withdrawal
    pub processor: Address,
    pub recipient: Address,
    pub fee_recipient: Address,
    pub relay_fee_bps: U256,
}

impl WithdrawalRequest {
    /// serialized relay parameters, also shipped to the relayer verbatim
    pub fn relay_data(&self) -> Vec<U256> {
        vec![
            U256::from_be_slice(self.recipient.as_slice()),
            U256::from_be_slice(self.fee_recipient.as_slice()),
            self.relay_fee_bps,
        ]
    }
}

/// context hash binding a withdrawal request to a scope
///
/// recomputed for every proof attempt: recipient and fee may change between
/// quote refreshes, and a cached context would bind the proof to stale
/// parameters
pub fn withdrawal_context(request: &WithdrawalRequest, scope: U256) -> U256 {
    let mut parts = vec![U256::from_be_slice(request.processor.as_slice())];
    parts.extend(request.relay_data());
    parts.push(scope);
    hash_parts(DOMAIN_CONTEXT, &parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WithdrawalRequest {
        WithdrawalRequest {
            processor: Address::repeat_byte(0x11),
            recipient: Address::repeat_byte(0x22),
            fee_recipient: Address::repeat_byte(0x33),
            relay_fee_bps: U256::from(100u64),
        }
    }

    #[test]
    fn commitment_hash_binds_every_input() {
        let base = commitment_hash(
            U256::from(1u64),
            U256::from(2u64),
            U256::from(3u64),
            U256::from(4u64),
        );
        for (v, l, n, s) in [
            (9u64, 2, 3, 4),
            (1, 9, 3, 4),
            (1, 2, 9, 4),
            (1, 2, 3, 9),
        ] {
            let other = commitment_hash(
                U256::from(v),
                U256::from(l),
                U256::from(n),
                U256::from(s),
            );
            assert_ne!(base, other);
        }
    }

    #[test]
    fn hashes_embed_in_field() {
        let h = commitment_hash(
            U256::MAX,
            U256::MAX,
            U256::MAX,
            U256::MAX,
        );
        assert!(h < U256::from(1u8) << 248usize);
    }

    #[test]
    fn context_binds_scope_and_fee() {
        let scope = U256::from(7u64);
        let base = withdrawal_context(&request(), scope);
        assert_eq!(base, withdrawal_context(&request(), scope));

        let mut bumped_fee = request();
        bumped_fee.relay_fee_bps = U256::from(250u64);
        assert_ne!(base, withdrawal_context(&bumped_fee, scope));

        assert_ne!(base, withdrawal_context(&request(), U256::from(8u64)));
    }

    #[test]
    fn domains_separate_precommitment_and_nullifier_hash() {
        let n = U256::from(3u64);
        let s = U256::from(4u64);
        assert_ne!(precommitment_hash(n, s), commitment_hash(n, s, n, s));
        assert_ne!(nullifier_hash(n), precommitment_hash(n, s));
    }
}
