use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur while processing a payment request.
///
/// Validation-stage errors (`DuplicateRequest`, `RateLimitExceeded`,
/// `Validation`) are returned to the caller before a job is created.
/// Execution-stage errors are retried per the queue's backoff policy when
/// [`PaymentError::is_retryable`] says so, and surfaced only once the retry
/// budget is exhausted or the error is terminal.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// A non-expired record already exists for this idempotency key.
    #[error("duplicate request for idempotency key `{0}`")]
    DuplicateRequest(String),

    /// The wallet's transaction budget for the current window is exhausted.
    #[error("rate limit exceeded for wallet `{0}`")]
    RateLimitExceeded(String),

    /// The source wallet cannot cover the transfer. Terminal.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    /// The ledger backend failed or timed out. Retryable.
    #[error("ledger backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The circuit breaker is open; the backend was not invoked. Retryable.
    #[error("circuit open: ledger backend is degraded")]
    CircuitOpen,

    /// All retry attempts were consumed. Terminal.
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    QueueExhausted { attempts: u32, last_error: String },

    /// The audit record for a settlement could not be written. A settlement
    /// whose record is not durable must not be reported as successful.
    #[error("audit write failure: {0}")]
    AuditWriteFailure(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the worker may schedule another attempt for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::CircuitOpen)
    }

    /// Stable identifier used in settlement results and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateRequest(_) => "DuplicateRequest",
            Self::RateLimitExceeded(_) => "RateLimitExceeded",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::BackendUnavailable(_) => "BackendUnavailable",
            Self::CircuitOpen => "CircuitOpen",
            Self::QueueExhausted { .. } => "QueueExhausted",
            Self::AuditWriteFailure(_) => "AuditWriteFailure",
            Self::Validation(_) => "Validation",
            Self::Config(_) => "Config",
            Self::Csv(_) => "Csv",
            Self::Io(_) => "Io",
            Self::Internal(_) => "Internal",
        }
    }
}
