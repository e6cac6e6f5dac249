use crate::domain::job::JobOutcome;
use crate::domain::payment::{PaymentRequest, SettlementResult};
use crate::error::{PaymentError, Result};
use crate::infrastructure::idempotency::IdempotencyGuard;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Front door of the pipeline.
///
/// Validates and deduplicates a request, consumes rate budget, enqueues a
/// job and suspends the caller until the job reaches a terminal state or the
/// wait budget expires. Validation-stage failures short-circuit before a job
/// is ever created. A wait-budget expiry reports a pending result; the job
/// itself keeps running — there is no mid-flight cancellation.
pub struct PaymentService {
    idempotency: Arc<IdempotencyGuard>,
    rate_limiter: Arc<RateLimiter>,
    queue: Arc<JobQueue>,
    /// Overall caller wait, derived from the queue's retry schedule.
    wait_budget: Duration,
}

impl PaymentService {
    pub fn new(
        idempotency: Arc<IdempotencyGuard>,
        rate_limiter: Arc<RateLimiter>,
        queue: Arc<JobQueue>,
        wait_budget: Duration,
    ) -> Self {
        Self {
            idempotency,
            rate_limiter,
            queue,
            wait_budget,
        }
    }

    pub async fn request_payment(&self, request: PaymentRequest) -> Result<SettlementResult> {
        request.validate()?;

        self.idempotency.check(&request.idempotency_key).await?;

        if let Err(err) = self.rate_limiter.consume(&request.from).await {
            // No job was created, so the key is not considered used.
            self.idempotency.release(&request.idempotency_key).await;
            return Err(err);
        }

        let key = request.idempotency_key.clone();
        debug!(%key, from = %request.from, to = %request.to, "request accepted");
        let mut enqueued = self.queue.enqueue(request).await;

        let result = match timeout(
            self.wait_budget,
            enqueued.outcome.wait_for(|outcome| outcome.is_some()),
        )
        .await
        {
            Ok(Ok(outcome)) => match outcome.clone() {
                Some(JobOutcome::Settled(receipt)) => SettlementResult::settled(&receipt),
                Some(JobOutcome::Failed(reason)) => SettlementResult::failed(reason.code),
                None => return Err(PaymentError::internal("job channel yielded empty outcome")),
            },
            Ok(Err(_)) => {
                return Err(PaymentError::internal("job outcome channel closed"));
            }
            Err(_) => {
                info!(%key, job = %enqueued.id, "wait budget expired, reporting pending");
                SettlementResult::pending()
            }
        };

        self.idempotency.save(&key, result.clone()).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BreakerConfig, IdempotencyConfig, QueueConfig, RateLimitConfig,
    };
    use crate::domain::payment::{Amount, TransferReceipt, TransferStatus};
    use crate::domain::ports::{LedgerBackend, SharedLedger};
    use crate::application::worker::Worker;
    use crate::infrastructure::audit::{AuditEventType, AuditLog};
    use crate::infrastructure::breaker::{BreakerState, CircuitBreaker};
    use crate::infrastructure::simulated::SimulatedLedger;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;
    use tokio::sync::watch;

    struct FailingLedger {
        invocations: AtomicU32,
    }

    #[async_trait]
    impl LedgerBackend for FailingLedger {
        async fn get_balance(&self, _wallet: &str) -> Result<Decimal> {
            Err(PaymentError::backend_unavailable("down"))
        }

        async fn transfer(
            &self,
            _from: &str,
            _to: &str,
            _amount: Amount,
        ) -> Result<TransferReceipt> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Err(PaymentError::backend_unavailable("down"))
        }

        async fn verify(&self, _tx_id: &str) -> Result<TransferStatus> {
            Err(PaymentError::backend_unavailable("down"))
        }

        fn network(&self) -> &str {
            "simulated"
        }
    }

    struct Stack {
        service: PaymentService,
        audit: Arc<AuditLog>,
        breaker: Arc<CircuitBreaker>,
        shutdown: watch::Sender<bool>,
        _dir: tempfile::TempDir,
    }

    async fn stack(
        ledger: SharedLedger,
        queue_config: QueueConfig,
        breaker_config: BreakerConfig,
        rate_config: RateLimitConfig,
        wait_budget: Duration,
    ) -> Stack {
        let dir = tempdir().unwrap();
        let queue = Arc::new(JobQueue::new("payments", queue_config));
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).await.unwrap());
        let breaker = Arc::new(CircuitBreaker::new(breaker_config));
        let idempotency = Arc::new(IdempotencyGuard::new(IdempotencyConfig::default()));
        let rate_limiter = Arc::new(RateLimiter::new(rate_config));

        let (shutdown, shutdown_rx) = watch::channel(false);
        Worker::new(
            Arc::clone(&queue),
            ledger,
            Arc::clone(&breaker),
            Arc::clone(&audit),
        )
        .spawn(shutdown_rx);

        let service = PaymentService::new(idempotency, rate_limiter, queue, wait_budget);
        Stack {
            service,
            audit,
            breaker,
            shutdown,
            _dir: dir,
        }
    }

    fn request(key: &str, amount: Decimal) -> PaymentRequest {
        PaymentRequest::new("alice", "bob", Amount::new(amount).unwrap(), key).unwrap()
    }

    fn fast_breaker() -> BreakerConfig {
        BreakerConfig {
            call_timeout: Duration::from_millis(500),
            ..BreakerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_settles_and_saves_result() {
        let ledger = SimulatedLedger::new();
        let stack = stack(
            Arc::new(ledger.clone()),
            QueueConfig::default(),
            fast_breaker(),
            RateLimitConfig::default(),
            Duration::from_secs(5),
        )
        .await;

        let result = stack
            .service
            .request_payment(request("k1", dec!(100)))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.network.as_deref(), Some("simulated"));
        assert!(result.error.is_none());
        assert_eq!(ledger.get_balance("alice").await.unwrap(), dec!(900));
        assert_eq!(ledger.get_balance("bob").await.unwrap(), dec!(1100));

        let records = stack.audit.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].r#type, AuditEventType::Payment);
        assert_eq!(records[0].tx_id, result.transaction_id);

        stack.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected_synchronously() {
        let stack = stack(
            Arc::new(SimulatedLedger::new()),
            QueueConfig::default(),
            fast_breaker(),
            RateLimitConfig::default(),
            Duration::from_secs(5),
        )
        .await;

        stack
            .service
            .request_payment(request("k1", dec!(10)))
            .await
            .unwrap();

        let err = stack
            .service
            .request_payment(request("k1", dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateRequest(_)));

        // only the first submission produced a job and an audit record
        assert_eq!(stack.audit.records().await.unwrap().len(), 1);
        stack.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_and_releases_key() {
        let stack = stack(
            Arc::new(SimulatedLedger::new()),
            QueueConfig::default(),
            fast_breaker(),
            RateLimitConfig {
                points: 1,
                window: Duration::from_millis(100),
            },
            Duration::from_secs(5),
        )
        .await;

        stack
            .service
            .request_payment(request("k1", dec!(10)))
            .await
            .unwrap();

        let err = stack
            .service
            .request_payment(request("k2", dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::RateLimitExceeded(_)));

        // the rejected key was released; it works once the window rolls over
        tokio::time::sleep(Duration::from_millis(150)).await;
        stack
            .service
            .request_payment(request("k2", dec!(10)))
            .await
            .unwrap();

        stack.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_funds_surfaces_with_audit() {
        let ledger = SimulatedLedger::new();
        ledger.set_balance("alice", dec!(50)).await;
        let stack = stack(
            Arc::new(ledger.clone()),
            QueueConfig::default(),
            fast_breaker(),
            RateLimitConfig::default(),
            Duration::from_secs(5),
        )
        .await;

        let result = stack
            .service
            .request_payment(request("k1", dec!(100)))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("InsufficientFunds"));
        assert_eq!(ledger.get_balance("alice").await.unwrap(), dec!(50));
        assert_eq!(ledger.get_balance("bob").await.unwrap(), dec!(1000));

        let records = stack.audit.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].r#type, AuditEventType::PaymentFailed);

        stack.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_degraded_backend_trips_breaker_and_exhausts() {
        let ledger = Arc::new(FailingLedger {
            invocations: AtomicU32::new(0),
        });
        let stack = stack(
            Arc::clone(&ledger) as SharedLedger,
            QueueConfig {
                max_attempts: 5,
                backoff_base: Duration::from_millis(10),
                ..QueueConfig::default()
            },
            BreakerConfig {
                call_timeout: Duration::from_millis(500),
                min_samples: 2,
                ..BreakerConfig::default()
            },
            RateLimitConfig::default(),
            Duration::from_secs(10),
        )
        .await;

        let result = stack
            .service
            .request_payment(request("k1", dec!(100)))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("QueueExhausted"));
        assert_eq!(stack.breaker.state().await, BreakerState::Open);
        // attempts 3..5 were short-circuited by the open breaker
        assert_eq!(ledger.invocations.load(Ordering::SeqCst), 2);

        stack.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_wait_budget_expiry_reports_pending() {
        struct SlowLedger(SimulatedLedger);

        #[async_trait]
        impl LedgerBackend for SlowLedger {
            async fn get_balance(&self, wallet: &str) -> Result<Decimal> {
                self.0.get_balance(wallet).await
            }

            async fn transfer(
                &self,
                from: &str,
                to: &str,
                amount: Amount,
            ) -> Result<TransferReceipt> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.0.transfer(from, to, amount).await
            }

            async fn verify(&self, tx_id: &str) -> Result<TransferStatus> {
                self.0.verify(tx_id).await
            }

            fn network(&self) -> &str {
                "simulated"
            }
        }

        let inner = SimulatedLedger::new();
        let stack = stack(
            Arc::new(SlowLedger(inner.clone())),
            QueueConfig::default(),
            fast_breaker(),
            RateLimitConfig::default(),
            Duration::from_millis(50),
        )
        .await;

        let result = stack
            .service
            .request_payment(request("k1", dec!(100)))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Pending"));

        // the job was not cancelled; it settles after the caller gave up
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(inner.get_balance("alice").await.unwrap(), dec!(900));

        // the key stays reserved for the retention window
        let err = stack
            .service
            .request_payment(request("k1", dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateRequest(_)));

        stack.shutdown.send(true).unwrap();
    }
}
