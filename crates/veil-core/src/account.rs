//! pool positions and their commitment chains
//!
//! one position = one deposit plus the ordered chain of change commitments
//! left by partial withdrawals (deposit -> child0 -> child1 -> ...). only
//! the last link is spendable. a ragequit closes the chain permanently.
//!
//! balance and spendability are always derived from the chain, never
//! cached: a stored copy could desync from the commitments it summarizes.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::error::{Result, VeilError};

/// association-set review state of a position, composed with local state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    /// not yet approved by the association set
    Pending,
    /// label present in the association set, position spendable
    Approved,
    /// approved and fully withdrawn
    Spent,
    /// ragequit executed, position closed
    Exited,
}

impl ReviewStatus {
    fn rank(self) -> u8 {
        match self {
            ReviewStatus::Pending => 0,
            ReviewStatus::Approved => 1,
            ReviewStatus::Spent => 2,
            ReviewStatus::Exited => 3,
        }
    }

    /// transitions only move forward (PENDING -> APPROVED -> SPENT, or
    /// anything -> EXITED); reconciliation must never regress a position
    pub fn can_advance_to(self, next: ReviewStatus) -> bool {
        if self == ReviewStatus::Exited {
            return next == ReviewStatus::Exited;
        }
        next.rank() >= self.rank()
    }
}

/// per-label review record supplied by the association-set provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReviewRecord {
    pub label: U256,
    pub status: ReviewStatus,
    pub timestamp: Option<u64>,
}

/// terminal ragequit event attached to a position
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagequitInfo {
    pub ragequitter: Address,
    pub commitment: U256,
    pub label: U256,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
    pub timestamp: Option<u64>,
}

/// one deposit and its withdrawal lifecycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAccount {
    pub chain_id: u64,
    pub scope: U256,
    /// deposit index within the scope (drives secret derivation)
    pub index: u64,
    /// contract-assigned identifier tying the position to its deposit
    pub label: U256,
    pub deposit: Commitment,
    /// change commitments in chronological spend order, append-only
    pub children: Vec<Commitment>,
    pub ragequit: Option<RagequitInfo>,
    pub review_status: ReviewStatus,
    /// label currently present in the association-set tree
    pub in_asp_set: bool,
}

impl PoolAccount {
    pub fn from_deposit(chain_id: u64, scope: U256, index: u64, deposit: Commitment) -> Self {
        Self {
            chain_id,
            scope,
            index,
            label: deposit.label,
            deposit,
            children: Vec::new(),
            ragequit: None,
            review_status: ReviewStatus::Pending,
            in_asp_set: false,
        }
    }

    /// the only currently spendable commitment of this position
    pub fn last_commitment(&self) -> &Commitment {
        self.children.last().unwrap_or(&self.deposit)
    }

    /// derived: last commitment's value, or zero once exited
    pub fn balance(&self) -> U256 {
        if self.ragequit.is_some() {
            U256::ZERO
        } else {
            self.last_commitment().value
        }
    }

    pub fn is_spendable(&self) -> bool {
        self.ragequit.is_none()
            && self.review_status == ReviewStatus::Approved
            && !self.balance().is_zero()
    }

    /// append the change commitment left after spending `parent_hash`
    ///
    /// the parent must be the current frontier (forking the chain is a
    /// logic bug) and the child can never hold more than its parent
    pub fn append_withdrawal(&mut self, parent_hash: U256, child: Commitment) -> Result<()> {
        if self.ragequit.is_some() {
            return Err(VeilError::AlreadyExited(self.label));
        }
        let frontier = self.last_commitment();
        if parent_hash != frontier.hash {
            return Err(VeilError::UnknownParent(parent_hash));
        }
        if child.value > frontier.value {
            return Err(VeilError::InvalidChildValue {
                parent: frontier.value,
                child: child.value,
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// close the position; idempotent for the same event, an error for a
    /// different one
    pub fn append_ragequit(&mut self, event: RagequitInfo) -> Result<()> {
        match &self.ragequit {
            Some(existing)
                if existing.tx_hash == event.tx_hash
                    && existing.label == event.label
                    && existing.value == event.value =>
            {
                Ok(())
            }
            Some(_) => Err(VeilError::ConflictingRagequit(self.label)),
            None => {
                self.ragequit = Some(event);
                self.review_status = ReviewStatus::Exited;
                self.in_asp_set = false;
                Ok(())
            }
        }
    }

    /// fold an association-set review into the local state
    ///
    /// an APPROVED report whose leaf has not reached the ASP tree yet stays
    /// PENDING; an approved position with nothing left to spend is SPENT;
    /// transitions are monotonic
    pub fn apply_review(&mut self, reported: ReviewStatus, leaf_in_asp_set: bool) {
        if self.ragequit.is_some() {
            self.review_status = ReviewStatus::Exited;
            self.in_asp_set = false;
            return;
        }

        let mut next = reported;
        if reported == ReviewStatus::Approved && !leaf_in_asp_set {
            next = ReviewStatus::Pending;
        }
        if reported == ReviewStatus::Approved && self.balance().is_zero() {
            next = ReviewStatus::Spent;
        }

        if self.review_status.can_advance_to(next) {
            self.review_status = next;
        }
        self.in_asp_set = leaf_in_asp_set && self.review_status == ReviewStatus::Approved;
    }

    /// flatten the position into history entries (deposit, one per
    /// withdrawal, exit); withdrawal amounts are parent-minus-child
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        let mut entries = vec![HistoryEntry {
            kind: AccountEventKind::Deposit,
            amount: self.deposit.value,
            tx_hash: self.deposit.tx_hash,
            timestamp: self.deposit.timestamp.unwrap_or(0),
            review_status: self.review_status,
            label: self.label,
            scope: self.scope,
        }];

        for (idx, child) in self.children.iter().enumerate() {
            let parent_value = if idx == 0 {
                self.deposit.value
            } else {
                self.children[idx - 1].value
            };
            entries.push(HistoryEntry {
                kind: AccountEventKind::Withdrawal,
                amount: parent_value.saturating_sub(child.value),
                tx_hash: child.tx_hash,
                timestamp: child.timestamp.unwrap_or(0),
                review_status: ReviewStatus::Approved,
                label: self.label,
                scope: self.scope,
            });
        }

        if let Some(ragequit) = &self.ragequit {
            entries.push(HistoryEntry {
                kind: AccountEventKind::Exit,
                amount: ragequit.value,
                tx_hash: ragequit.tx_hash,
                timestamp: ragequit.timestamp.unwrap_or(0),
                review_status: ReviewStatus::Approved,
                label: self.label,
                scope: self.scope,
            });
        }

        entries
    }
}

/// kind of a history entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEventKind {
    Deposit,
    Withdrawal,
    Exit,
}

/// one row of the account's activity feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: AccountEventKind,
    pub amount: U256,
    pub tx_hash: B256,
    pub timestamp: u64,
    pub review_status: ReviewStatus,
    pub label: U256,
    pub scope: U256,
}
