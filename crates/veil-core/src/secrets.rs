//! deterministic secret derivation
//!
//! every secret a user ever needs inside a pool is a pure function of one
//! seed phrase. deposit secrets are keyed by (scope, index); spend secrets
//! are keyed by the commitment being spent. nothing here does I/O and
//! nothing here is ever persisted.

use alloy_primitives::U256;
use bip39::Mnemonic;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::commitment::{precommitment_hash, Commitment};
use crate::error::{Result, VeilError};
use crate::{
    DOMAIN_DEPOSIT_NULLIFIER, DOMAIN_DEPOSIT_SECRET, DOMAIN_MASTER_KEY, DOMAIN_SPEND_NULLIFIER,
    DOMAIN_SPEND_SECRET,
};

/// secrets for a fresh deposit at (scope, index)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepositSecrets {
    pub nullifier: U256,
    pub secret: U256,
    /// H(nullifier, secret) - submitted with the deposit, later matched
    /// against on-chain deposit events to recover the position's label
    pub precommitment: U256,
}

/// secrets for the change commitment left after spending an existing one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpendSecrets {
    pub nullifier: U256,
    pub secret: U256,
}

/// root of the key hierarchy - held in memory for the session only,
/// wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKeys {
    master: [u8; 32],
}

impl MasterKeys {
    /// derive from a seed phrase
    ///
    /// any non-empty phrase is accepted; wallets that want checksummed
    /// phrases should generate them with [`MasterKeys::generate`]
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let normalized = phrase.trim();
        if normalized.is_empty() {
            return Err(VeilError::InvalidSeed("empty seed phrase".into()));
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_MASTER_KEY);
        hasher.update(normalized.as_bytes());
        Ok(Self {
            master: *hasher.finalize().as_bytes(),
        })
    }

    /// generate a fresh 12-word mnemonic and the keys derived from it
    pub fn generate() -> Result<(Self, String)> {
        let mnemonic = Mnemonic::generate(12).map_err(|e| VeilError::InvalidSeed(e.to_string()))?;
        let phrase = mnemonic.to_string();
        let keys = Self::from_phrase(&phrase)?;
        Ok((keys, phrase))
    }

    /// strict variant of [`MasterKeys::from_phrase`]: the phrase must be a
    /// valid BIP-39 mnemonic (rejects typos via the checksum)
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        Mnemonic::parse(phrase.trim()).map_err(|e| VeilError::InvalidSeed(e.to_string()))?;
        Self::from_phrase(phrase)
    }

    /// secrets for the deposit at `index` within `scope`
    ///
    /// `index` must be the per-scope monotonic deposit counter so repeated
    /// deposits never reuse a prior position's secrets
    pub fn deposit_secrets(&self, scope: U256, index: u64) -> DepositSecrets {
        let nullifier = self.derive(
            DOMAIN_DEPOSIT_NULLIFIER,
            &[&scope.to_be_bytes::<32>(), &index.to_le_bytes()],
        );
        let secret = self.derive(
            DOMAIN_DEPOSIT_SECRET,
            &[&scope.to_be_bytes::<32>(), &index.to_le_bytes()],
        );
        DepositSecrets {
            nullifier,
            secret,
            precommitment: precommitment_hash(nullifier, secret),
        }
    }

    /// secrets for the next commitment in the chain after spending `parent`
    ///
    /// bound to the parent's (label, hash, value) so each link in the chain
    /// gets distinct material
    pub fn spend_secrets(&self, parent: &Commitment) -> SpendSecrets {
        let parts: [&[u8]; 3] = [
            &parent.label.to_be_bytes::<32>(),
            &parent.hash.to_be_bytes::<32>(),
            &parent.value.to_be_bytes::<32>(),
        ];
        SpendSecrets {
            nullifier: self.derive(DOMAIN_SPEND_NULLIFIER, &parts),
            secret: self.derive(DOMAIN_SPEND_SECRET, &parts),
        }
    }

    fn derive(&self, domain: &[u8], parts: &[&[u8]]) -> U256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(&self.master);
        for part in parts {
            hasher.update(part);
        }
        crate::commitment::digest_to_uint(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_seed_rejected() {
        assert!(matches!(
            MasterKeys::from_phrase("   "),
            Err(VeilError::InvalidSeed(_))
        ));
    }

    #[test]
    fn strict_mnemonic_rejects_garbage() {
        assert!(MasterKeys::from_mnemonic("definitely not a mnemonic").is_err());
    }

    #[test]
    fn generated_mnemonic_round_trips() {
        let (keys, phrase) = MasterKeys::generate().unwrap();
        let again = MasterKeys::from_mnemonic(&phrase).unwrap();
        let scope = U256::from(7u64);
        assert_eq!(keys.deposit_secrets(scope, 0), again.deposit_secrets(scope, 0));
    }

    #[test]
    fn deposit_secrets_deterministic() {
        let keys = MasterKeys::from_phrase("test-seed").unwrap();
        let scope = U256::from(7u64);
        assert_eq!(keys.deposit_secrets(scope, 3), keys.deposit_secrets(scope, 3));
    }

    #[test]
    fn deposit_secrets_distinct_across_indices_and_scopes() {
        let keys = MasterKeys::from_phrase("test-seed").unwrap();
        let a = keys.deposit_secrets(U256::from(7u64), 0);
        let b = keys.deposit_secrets(U256::from(7u64), 1);
        let c = keys.deposit_secrets(U256::from(8u64), 0);
        assert_ne!(a.nullifier, b.nullifier);
        assert_ne!(a.secret, b.secret);
        assert_ne!(a.precommitment, b.precommitment);
        assert_ne!(a.precommitment, c.precommitment);
    }

    #[test]
    fn spend_secrets_bound_to_parent() {
        let keys = MasterKeys::from_phrase("test-seed").unwrap();
        let ds = keys.deposit_secrets(U256::from(7u64), 0);
        let parent = Commitment::compute(
            U256::from(1000u64),
            U256::from(42u64),
            ds.nullifier,
            ds.secret,
            10,
            Default::default(),
        );
        let mut other = parent.clone();
        other.value = U256::from(999u64);
        other.hash = crate::commitment::commitment_hash(
            other.value,
            other.label,
            other.nullifier,
            other.secret,
        );
        assert_ne!(keys.spend_secrets(&parent), keys.spend_secrets(&other));
    }

    proptest! {
        #[test]
        fn no_collision_between_distinct_indices(i in 0u64..512, j in 0u64..512) {
            prop_assume!(i != j);
            let keys = MasterKeys::from_phrase("prop-seed").unwrap();
            let scope = U256::from(7u64);
            prop_assert_ne!(
                keys.deposit_secrets(scope, i).precommitment,
                keys.deposit_secrets(scope, j).precommitment
            );
        }
    }
}
