use crate::domain::payment::{Amount, TransferReceipt, TransferStatus};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Capability interface over a ledger.
///
/// Exactly one implementation is active per process instance, chosen from
/// configuration at startup. The worker is the only pipeline component that
/// invokes it, always through the circuit breaker.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Current balance of a wallet.
    async fn get_balance(&self, wallet: &str) -> Result<Decimal>;

    /// Move `amount` from `from` to `to`.
    ///
    /// Fails with `InsufficientFunds` when the source balance is below
    /// `amount`, and with `BackendUnavailable` on network or protocol errors.
    async fn transfer(&self, from: &str, to: &str, amount: Amount) -> Result<TransferReceipt>;

    /// Status of a previously executed transfer.
    async fn verify(&self, tx_id: &str) -> Result<TransferStatus>;

    /// Network label stamped on receipts from this backend.
    fn network(&self) -> &str;
}

/// Shared handle to the process's single active backend.
pub type SharedLedger = Arc<dyn LedgerBackend>;
