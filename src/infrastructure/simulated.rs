use crate::domain::payment::{Amount, TransferReceipt, TransferStatus};
use crate::domain::ports::LedgerBackend;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Balance granted to any unseen wallet on first read.
pub const DEFAULT_BALANCE: Decimal = Decimal::ONE_THOUSAND;

/// In-process ledger for development and tests.
///
/// A single mutex guards the wallet table so check-then-debit-then-credit is
/// one atomic unit; two concurrent transfers can never both pass the balance
/// check against the same funds.
#[derive(Default, Clone)]
pub struct SimulatedLedger {
    inner: Arc<Mutex<SimulatedState>>,
}

#[derive(Default)]
struct SimulatedState {
    balances: HashMap<String, Decimal>,
    transfers: HashMap<String, TransferStatus>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a wallet balance, overriding the lazy default.
    pub async fn set_balance(&self, wallet: &str, balance: Decimal) {
        let mut state = self.inner.lock().await;
        state.balances.insert(wallet.to_string(), balance);
    }

    /// Sum of all materialized balances, for conservation checks.
    pub async fn total_balance(&self) -> Decimal {
        let state = self.inner.lock().await;
        state.balances.values().copied().sum()
    }
}

impl SimulatedState {
    fn balance_of(&mut self, wallet: &str) -> Decimal {
        *self
            .balances
            .entry(wallet.to_string())
            .or_insert(DEFAULT_BALANCE)
    }
}

#[async_trait]
impl LedgerBackend for SimulatedLedger {
    async fn get_balance(&self, wallet: &str) -> Result<Decimal> {
        let mut state = self.inner.lock().await;
        Ok(state.balance_of(wallet))
    }

    async fn transfer(&self, from: &str, to: &str, amount: Amount) -> Result<TransferReceipt> {
        let mut state = self.inner.lock().await;

        let available = state.balance_of(from);
        if available < amount.value() {
            return Err(PaymentError::InsufficientFunds {
                available,
                requested: amount.value(),
            });
        }

        let credited = state.balance_of(to) + amount.value();
        state.balances.insert(from.to_string(), available - amount.value());
        state.balances.insert(to.to_string(), credited);

        let tx_id = Uuid::new_v4().to_string();
        state.transfers.insert(tx_id.clone(), TransferStatus::Confirmed);

        Ok(TransferReceipt {
            tx_id,
            status: TransferStatus::Confirmed,
            network: self.network().to_string(),
        })
    }

    async fn verify(&self, tx_id: &str) -> Result<TransferStatus> {
        let state = self.inner.lock().await;
        state
            .transfers
            .get(tx_id)
            .copied()
            .ok_or_else(|| PaymentError::validation(format!("unknown transaction id `{tx_id}`")))
    }

    fn network(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_default_balance_on_first_read() {
        let ledger = SimulatedLedger::new();
        assert_eq!(ledger.get_balance("unseen").await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn test_transfer_moves_funds_and_conserves_total() {
        let ledger = SimulatedLedger::new();
        let receipt = ledger.transfer("a", "b", amount(dec!(100))).await.unwrap();

        assert_eq!(receipt.status, TransferStatus::Confirmed);
        assert_eq!(receipt.network, "simulated");
        assert_eq!(ledger.get_balance("a").await.unwrap(), dec!(900));
        assert_eq!(ledger.get_balance("b").await.unwrap(), dec!(1100));
        assert_eq!(ledger.total_balance().await, dec!(2000));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balances_unchanged() {
        let ledger = SimulatedLedger::new();
        ledger.set_balance("a", dec!(50)).await;

        let err = ledger.transfer("a", "b", amount(dec!(100))).await.unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientFunds { .. }));
        assert_eq!(ledger.get_balance("a").await.unwrap(), dec!(50));
        assert_eq!(ledger.get_balance("b").await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn test_verify_known_and_unknown_transfers() {
        let ledger = SimulatedLedger::new();
        let receipt = ledger.transfer("a", "b", amount(dec!(1))).await.unwrap();

        assert_eq!(
            ledger.verify(&receipt.tx_id).await.unwrap(),
            TransferStatus::Confirmed
        );
        assert!(ledger.verify("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_transfers_never_overdraw() {
        let ledger = SimulatedLedger::new();
        ledger.set_balance("hot", dec!(100)).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let ledger = ledger.clone();
            let to = format!("out-{i}");
            handles.push(tokio::spawn(async move {
                ledger.transfer("hot", &to, amount(dec!(30))).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        // 100 / 30 allows at most 3 transfers through
        assert_eq!(succeeded, 3);
        assert_eq!(ledger.get_balance("hot").await.unwrap(), dec!(10));
    }
}
