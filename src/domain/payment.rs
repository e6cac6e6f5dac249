use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A positive monetary amount.
///
/// Wrapper around `rust_decimal::Decimal` so a zero or negative transfer can
/// never be constructed, deserialized or enqueued.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::validation("amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client-submitted transfer request. Immutable once created.
///
/// The idempotency key identifies one logical submission attempt; resubmitting
/// under a used key within the retention window is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub from: String,
    pub to: String,
    pub amount: Amount,
    #[serde(rename = "key")]
    pub idempotency_key: String,
}

impl PaymentRequest {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Amount,
        idempotency_key: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        let request = Self {
            from: from.into(),
            to: to.into(),
            amount,
            idempotency_key: idempotency_key.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.from.is_empty() || self.to.is_empty() {
            return Err(PaymentError::validation("wallet identifiers must be non-empty"));
        }
        if self.idempotency_key.is_empty() {
            return Err(PaymentError::validation("idempotency key must be non-empty"));
        }
        Ok(())
    }
}

/// Outcome of a ledger transfer as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Confirmed,
    Pending,
    Failed,
}

/// Receipt returned by [`LedgerBackend::transfer`](crate::domain::ports::LedgerBackend::transfer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_id: String,
    pub status: TransferStatus,
    pub network: String,
}

/// What the caller gets back from the payment service.
///
/// Never persisted directly; it is derivable from the job's terminal state
/// and the audit record. `error` carries the stable error code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub network: Option<String>,
    pub error: Option<String>,
}

impl SettlementResult {
    pub fn settled(receipt: &TransferReceipt) -> Self {
        Self {
            success: true,
            transaction_id: Some(receipt.tx_id.clone()),
            network: Some(receipt.network.clone()),
            error: None,
        }
    }

    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            network: None,
            error: Some(code.into()),
        }
    }

    /// The caller's wait budget expired while the job was still in flight.
    pub fn pending() -> Self {
        Self {
            success: false,
            transaction_id: None,
            network: None,
            error: Some("Pending".into()),
        }
    }
}
