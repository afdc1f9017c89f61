//! proof generation scheduling
//!
//! the proving engine itself is opaque (possibly out-of-process) and slow
//! (seconds). the scheduler turns it into a task/channel collaborator:
//! submit a witness, hold a ticket for the result, and let a newer request
//! for the same position supersede a stale in-flight one - request
//! parameters change between quote refreshes, so only the latest witness
//! may reach the chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Result, VeilError};
use crate::witness::{RagequitWitness, WithdrawalWitness};

/// opaque proof, shaped as the calldata the contracts consume
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub elements: Vec<U256>,
}

/// opaque proving capability
pub trait ProofEngine: Send + Sync + 'static {
    fn prove_withdrawal(&self, witness: &WithdrawalWitness) -> Result<Proof>;
    fn prove_ragequit(&self, witness: &RagequitWitness) -> Result<Proof>;
    fn verify(&self, proof: &Proof) -> bool;
}

enum ProofRequest {
    Withdrawal(Box<WithdrawalWitness>),
    Ragequit(RagequitWitness),
}

struct ProofJob {
    label: U256,
    epoch: u64,
    request: ProofRequest,
    reply: oneshot::Sender<Result<Proof>>,
}

/// pending result of a submitted proof job
pub struct ProofTicket {
    rx: oneshot::Receiver<Result<Proof>>,
}

impl ProofTicket {
    /// wait for the proof; resolves to `ProofCancelled` if a newer request
    /// for the same position superseded this one
    pub async fn proof(self) -> Result<Proof> {
        self.rx.await.map_err(|_| VeilError::ProofCancelled)?
    }
}

/// worker-backed proof scheduler
///
/// dropping the scheduler closes the channel and shuts the worker down;
/// in-flight tickets resolve to `ProofCancelled`
pub struct ProofScheduler {
    tx: mpsc::Sender<ProofJob>,
    epochs: Arc<Mutex<HashMap<U256, u64>>>,
}

impl ProofScheduler {
    /// spawn the worker task (requires a tokio runtime)
    pub fn spawn(engine: Arc<dyn ProofEngine>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ProofJob>(16);
        let epochs: Arc<Mutex<HashMap<U256, u64>>> = Arc::new(Mutex::new(HashMap::new()));

        let worker_epochs = Arc::clone(&epochs);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if !is_current(&worker_epochs, job.label, job.epoch) {
                    debug!("skipping superseded proof job for {}", job.label);
                    let _ = job.reply.send(Err(VeilError::ProofCancelled));
                    continue;
                }

                let engine = Arc::clone(&engine);
                let request = job.request;
                let result = tokio::task::spawn_blocking(move || match request {
                    ProofRequest::Withdrawal(witness) => engine.prove_withdrawal(&witness),
                    ProofRequest::Ragequit(witness) => engine.prove_ragequit(&witness),
                })
                .await
                .unwrap_or_else(|e| Err(VeilError::Prover(e.to_string())));

                // the request may have been superseded while proving; a
                // stale proof must never reach the caller
                if !is_current(&worker_epochs, job.label, job.epoch) {
                    debug!("discarding stale proof for {}", job.label);
                    let _ = job.reply.send(Err(VeilError::ProofCancelled));
                    continue;
                }
                if let Err(ref e) = result {
                    warn!("proof generation for {} failed: {}", job.label, e);
                }
                let _ = job.reply.send(result);
            }
        });

        Self { tx, epochs }
    }

    pub async fn submit_withdrawal(
        &self,
        label: U256,
        witness: WithdrawalWitness,
    ) -> Result<ProofTicket> {
        self.submit(label, ProofRequest::Withdrawal(Box::new(witness)))
            .await
    }

    pub async fn submit_ragequit(
        &self,
        label: U256,
        witness: RagequitWitness,
    ) -> Result<ProofTicket> {
        self.submit(label, ProofRequest::Ragequit(witness)).await
    }

    async fn submit(&self, label: U256, request: ProofRequest) -> Result<ProofTicket> {
        let epoch = {
            let mut epochs = self.epochs.lock().expect("epoch map poisoned");
            let epoch = epochs.entry(label).or_insert(0);
            *epoch += 1;
            *epoch
        };
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ProofJob {
                label,
                epoch,
                request,
                reply,
            })
            .await
            .map_err(|_| VeilError::Prover("proof worker stopped".into()))?;
        Ok(ProofTicket { rx })
    }
}

fn is_current(epochs: &Mutex<HashMap<U256, u64>>, label: U256, epoch: u64) -> bool {
    epochs
        .lock()
        .map(|map| map.get(&label).copied().unwrap_or(0) == epoch)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// deterministic stand-in engine: "proof" is a digest of the witness
    struct DigestEngine {
        delay: Duration,
    }

    impl ProofEngine for DigestEngine {
        fn prove_withdrawal(&self, witness: &WithdrawalWitness) -> Result<Proof> {
            std::thread::sleep(self.delay);
            Ok(Proof {
                elements: vec![witness.context, witness.withdrawal_amount],
            })
        }

        fn prove_ragequit(&self, witness: &RagequitWitness) -> Result<Proof> {
            std::thread::sleep(self.delay);
            Ok(Proof {
                elements: vec![witness.value, witness.label],
            })
        }

        fn verify(&self, proof: &Proof) -> bool {
            !proof.elements.is_empty()
        }
    }

    fn ragequit_witness(value: u64) -> RagequitWitness {
        RagequitWitness {
            value: U256::from(value),
            label: U256::from(42u64),
            nullifier: U256::from(1u64),
            secret: U256::from(2u64),
        }
    }

    #[tokio::test]
    async fn proof_round_trips_through_the_worker() {
        let engine = Arc::new(DigestEngine {
            delay: Duration::ZERO,
        });
        let scheduler = ProofScheduler::spawn(engine.clone());

        let ticket = scheduler
            .submit_ragequit(U256::from(42u64), ragequit_witness(1000))
            .await
            .unwrap();
        let proof = ticket.proof().await.unwrap();
        assert_eq!(proof.elements[0], U256::from(1000u64));
        assert!(engine.verify(&proof));
    }

    #[tokio::test]
    async fn newer_request_supersedes_in_flight_one() {
        let scheduler = ProofScheduler::spawn(Arc::new(DigestEngine {
            delay: Duration::from_millis(50),
        }));

        let first = scheduler
            .submit_ragequit(U256::from(42u64), ragequit_witness(1000))
            .await
            .unwrap();
        let second = scheduler
            .submit_ragequit(U256::from(42u64), ragequit_witness(2000))
            .await
            .unwrap();

        assert!(matches!(
            first.proof().await,
            Err(VeilError::ProofCancelled)
        ));
        let proof = second.proof().await.unwrap();
        assert_eq!(proof.elements[0], U256::from(2000u64));
    }

    #[tokio::test]
    async fn distinct_positions_do_not_cancel_each_other() {
        let scheduler = ProofScheduler::spawn(Arc::new(DigestEngine {
            delay: Duration::from_millis(5),
        }));

        let a = scheduler
            .submit_ragequit(U256::from(1u64), ragequit_witness(100))
            .await
            .unwrap();
        let b = scheduler
            .submit_ragequit(U256::from(2u64), ragequit_witness(200))
            .await
            .unwrap();

        assert!(a.proof().await.is_ok());
        assert!(b.proof().await.is_ok());
    }

    #[tokio::test]
    async fn dropping_the_scheduler_cancels_tickets() {
        let scheduler = ProofScheduler::spawn(Arc::new(DigestEngine {
            delay: Duration::from_millis(200),
        }));
        let first = scheduler
            .submit_ragequit(U256::from(42u64), ragequit_witness(1000))
            .await
            .unwrap();
        // queue a second job behind the slow one, then drop the scheduler
        let second = scheduler
            .submit_ragequit(U256::from(7u64), ragequit_witness(1))
            .await
            .unwrap();
        drop(scheduler);

        // the first job was already picked up and completes; the second is
        // either cancelled with the channel or processed before shutdown
        let _ = first.proof().await;
        let _ = second.proof().await;
    }
}
