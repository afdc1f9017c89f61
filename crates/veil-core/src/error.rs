//! error types for veil

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VeilError {
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("duplicate label {label} in scope {scope}")]
    DuplicateLabel { scope: U256, label: U256 },

    #[error("parent commitment {0} is not the spendable frontier")]
    UnknownParent(U256),

    #[error("position with label {0} already exited")]
    AlreadyExited(U256),

    #[error("conflicting ragequit for label {0}")]
    ConflictingRagequit(U256),

    #[error("no position with label {0}")]
    UnknownLabel(U256),

    #[error("child value {child} exceeds parent value {parent}")]
    InvalidChildValue { parent: U256, child: U256 },

    #[error("commitment chain forked at nullifier hash {0}")]
    ChainForked(U256),

    #[error("on-chain commitment {onchain} does not match derived commitment {derived}")]
    CommitmentMismatch { onchain: U256, derived: U256 },

    #[error("merkle leaf {0} not found")]
    LeafNotFound(U256),

    #[error("merkle tree overflow: {count} leaves exceed depth {depth}")]
    TreeOverflow { count: usize, depth: usize },

    #[error("missing leaves: {0}")]
    MissingLeaves(&'static str),

    #[error("withdrawal amount {amount} exceeds balance {balance}")]
    AmountExceedsBalance { amount: U256, balance: U256 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("event source unavailable: {0}")]
    EventSource(String),

    #[error("proof job cancelled")]
    ProofCancelled,

    #[error("prover error: {0}")]
    Prover(String),

    #[error("relayer error: {0}")]
    Relayer(String),

    #[error("asp error: {0}")]
    Asp(String),
}

impl VeilError {
    /// recoverable by retry with backoff; everything else is a derivation,
    /// integrity or input error and must surface to the caller immediately
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VeilError::EventSource(_) | VeilError::Asp(_) | VeilError::Relayer(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VeilError>;
