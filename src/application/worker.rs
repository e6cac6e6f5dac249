use crate::domain::job::FailureReason;
use crate::domain::payment::{PaymentRequest, TransferReceipt};
use crate::domain::ports::SharedLedger;
use crate::error::PaymentError;
use crate::infrastructure::audit::{AuditEvent, AuditEventType, AuditLog};
use crate::infrastructure::breaker::CircuitBreaker;
use crate::infrastructure::queue::{ClaimedJob, JobQueue};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Pulls jobs from the queue and executes them against the ledger.
///
/// The worker is the only component that invokes the ledger backend, always
/// through the circuit breaker. Every terminal outcome is written to the
/// audit log before the job is finalized, so a caller never observes a
/// settlement that lacks its record. Multiple workers may run in parallel;
/// the queue guarantees each job is held by one of them at a time.
pub struct Worker {
    queue: Arc<JobQueue>,
    ledger: SharedLedger,
    breaker: Arc<CircuitBreaker>,
    audit: Arc<AuditLog>,
}

impl Worker {
    pub fn new(
        queue: Arc<JobQueue>,
        ledger: SharedLedger,
        breaker: Arc<CircuitBreaker>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            queue,
            ledger,
            breaker,
            audit,
        }
    }

    /// Runs the claim loop on a new task until `shutdown` flips to `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let claimed = tokio::select! {
                claimed = self.queue.claim() => claimed,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(queue = self.queue.name(), "worker shutting down");
                        return;
                    }
                    continue;
                }
            };
            self.process(claimed).await;
        }
    }

    async fn process(&self, claimed: ClaimedJob) {
        let ClaimedJob {
            id,
            payload,
            attempt,
        } = claimed;

        let result = self
            .breaker
            .call(|| self.ledger.transfer(&payload.from, &payload.to, payload.amount))
            .await;

        let finalized = match result {
            Ok(receipt) => self.settle(id, &payload, receipt).await,
            Err(err) if err.is_retryable() => {
                let max_attempts = self.queue.config().max_attempts;
                if attempt < max_attempts {
                    warn!(job = %id, attempt, %err, "attempt failed, scheduling retry");
                    self.queue.retry(id, &err).await.map(|_| ())
                } else {
                    let exhausted = PaymentError::QueueExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    };
                    warn!(job = %id, attempt, %err, "retry budget exhausted");
                    self.fail(id, &payload, &exhausted).await
                }
            }
            Err(err) => {
                warn!(job = %id, attempt, %err, "non-retryable failure");
                self.fail(id, &payload, &err).await
            }
        };

        if let Err(err) = finalized {
            error!(job = %id, %err, "failed to finalize job");
        }
    }

    /// Audits a settlement and completes the job. An audit write failure
    /// downgrades the outcome to a terminal failure: funds moved, but the
    /// success is not reported without its record.
    async fn settle(
        &self,
        id: uuid::Uuid,
        payload: &PaymentRequest,
        receipt: TransferReceipt,
    ) -> crate::error::Result<()> {
        let event = AuditEvent {
            r#type: AuditEventType::Payment,
            from: payload.from.clone(),
            to: payload.to.clone(),
            amount: payload.amount.value(),
            tx_id: Some(receipt.tx_id.clone()),
            network: receipt.network.clone(),
        };

        match self.audit.append(event).await {
            Ok(_) => {
                info!(job = %id, tx = %receipt.tx_id, "payment settled");
                self.queue.complete(id, receipt).await
            }
            Err(err) => {
                error!(job = %id, tx = %receipt.tx_id, %err, "audit append failed for settlement");
                let reason = FailureReason {
                    code: "AuditWriteFailure",
                    message: format!("{err} (settled transfer {} unrecorded)", receipt.tx_id),
                };
                self.queue.fail(id, reason).await
            }
        }
    }

    async fn fail(
        &self,
        id: uuid::Uuid,
        payload: &PaymentRequest,
        err: &PaymentError,
    ) -> crate::error::Result<()> {
        let event = AuditEvent {
            r#type: AuditEventType::PaymentFailed,
            from: payload.from.clone(),
            to: payload.to.clone(),
            amount: payload.amount.value(),
            tx_id: None,
            network: self.ledger.network().to_string(),
        };
        if let Err(audit_err) = self.audit.append(event).await {
            error!(job = %id, %audit_err, "audit append failed for failure record");
        }
        self.queue.fail(id, FailureReason::from(err)).await
    }
}
