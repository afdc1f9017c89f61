//! veil-core - privacy-pool account reconstruction engine
//!
//! Deterministic, replay-driven core for a privacy-pool client:
//! - derives all secret material for a user's pool positions from one seed
//! - replays on-chain deposit/withdrawal/ragequit events into per-position
//!   commitment chains
//! - tracks spendability, balance and review status of every position
//! - assembles the numeric witnesses consumed by the (opaque) proving engine
//!
//! The surrounding application (wallets, UI, transaction submission) talks to
//! this crate through [`AccountSession`]; chain data, the association-set
//! provider and the relayer are abstract collaborators (see [`events`],
//! [`client`]).

pub mod account;
pub mod commitment;
pub mod config;
pub mod error;
pub mod events;
pub mod merkle;
pub mod prover;
pub mod replay;
pub mod secrets;
pub mod store;
pub mod witness;

#[cfg(feature = "client")]
pub mod client;

pub use account::{
    AccountEventKind, DepositReviewRecord, HistoryEntry, PoolAccount, RagequitInfo, ReviewStatus,
};
pub use commitment::{Commitment, WithdrawalRequest};
pub use config::{ChainConfig, PoolDescriptor, RelayerEndpoint};
pub use error::{Result, VeilError};
pub use events::{DepositEvent, EventSource, RagequitEvent, RetryPolicy, WithdrawalEvent};
pub use merkle::{MerkleProof, MerkleTree};
pub use prover::{Proof, ProofEngine, ProofScheduler, ProofTicket};
pub use secrets::{DepositSecrets, MasterKeys, SpendSecrets};
pub use store::{AccountIndex, AccountSession, ChainScope, LoadReport};
pub use witness::{RagequitWitness, WithdrawalWitness};

#[cfg(feature = "client")]
pub use client::{AspClient, RelayerClient, RpcEventSource};

/// domain separator for the master key
pub const DOMAIN_MASTER_KEY: &[u8] = b"veil.master-key.v1";
/// domain separator for deposit nullifiers
pub const DOMAIN_DEPOSIT_NULLIFIER: &[u8] = b"veil.deposit-nullifier.v1";
/// domain separator for deposit secrets
pub const DOMAIN_DEPOSIT_SECRET: &[u8] = b"veil.deposit-secret.v1";
/// domain separator for spend nullifiers
pub const DOMAIN_SPEND_NULLIFIER: &[u8] = b"veil.spend-nullifier.v1";
/// domain separator for spend secrets
pub const DOMAIN_SPEND_SECRET: &[u8] = b"veil.spend-secret.v1";
/// domain separator for commitment hashes
pub const DOMAIN_COMMITMENT: &[u8] = b"veil.commitment.v1";
/// domain separator for precommitment hashes
pub const DOMAIN_PRECOMMITMENT: &[u8] = b"veil.precommitment.v1";
/// domain separator for nullifier hashes
pub const DOMAIN_NULLIFIER_HASH: &[u8] = b"veil.nullifier-hash.v1";
/// domain separator for withdrawal contexts
pub const DOMAIN_CONTEXT: &[u8] = b"veil.context.v1";
/// domain separator for merkle tree nodes
pub const DOMAIN_MERKLE_NODE: &[u8] = b"veil.merkle-node.v1";

/// depth of the pool state tree (commitment hashes)
pub const STATE_TREE_DEPTH: usize = 32;
/// depth of the association-set tree (approved labels)
pub const ASP_TREE_DEPTH: usize = 32;
