use crate::domain::payment::{PaymentRequest, TransferReceipt};
use crate::error::PaymentError;
use tokio::time::Instant;
use uuid::Uuid;

/// Lifecycle of a queued transfer job.
///
/// `queued → active → {completed | retry_scheduled → queued | failed}`;
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Active,
    RetryScheduled,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Why a job ended in `Failed`, in a form that can be broadcast to waiters.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReason {
    pub code: &'static str,
    pub message: String,
}

impl From<&PaymentError> for FailureReason {
    fn from(err: &PaymentError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Terminal result of one job, broadcast to the caller awaiting it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Settled(TransferReceipt),
    Failed(FailureReason),
}

/// One queued unit of work, derived 1:1 from a [`PaymentRequest`].
///
/// Owned by the queue until claimed; the claiming worker holds it exclusively
/// for the duration of one attempt.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub payload: PaymentRequest,
    pub attempts: u32,
    pub status: JobStatus,
    /// When a retry-scheduled job becomes eligible for claiming again.
    pub scheduled_at: Option<Instant>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(payload: PaymentRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            status: JobStatus::Queued,
            scheduled_at: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        PaymentRequest::new("alice", "bob", Amount::new(dec!(10)).unwrap(), "k1").unwrap()
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(request());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.scheduled_at.is_none());
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
        assert!(!JobStatus::RetryScheduled.is_terminal());
    }

    #[test]
    fn test_failure_reason_from_error() {
        let reason = FailureReason::from(&PaymentError::CircuitOpen);
        assert_eq!(reason.code, "CircuitOpen");
        assert!(reason.message.contains("degraded"));
    }
}
