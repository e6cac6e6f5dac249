use crate::config::IdempotencyConfig;
use crate::domain::payment::SettlementResult;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// One record per idempotency key.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    /// `None` while the submission is still in flight.
    pub outcome: Option<SettlementResult>,
    pub expires_at: Instant,
}

/// Deduplicates submissions sharing an idempotency key.
///
/// `check` atomically reserves the key, so of two concurrent submissions
/// under one key exactly one proceeds. Resubmission under a used key within
/// the retention window is rejected regardless of the stored outcome — the
/// prior result is never replayed; callers mint a fresh key per logical
/// attempt. Expired records are evicted lazily on access.
pub struct IdempotencyGuard {
    config: IdempotencyConfig,
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl IdempotencyGuard {
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves `key`, failing with `DuplicateRequest` if a non-expired
    /// record already exists.
    pub async fn check(&self, key: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        records.retain(|_, record| record.expires_at > now);

        if records.contains_key(key) {
            debug!(key, "duplicate submission rejected");
            return Err(PaymentError::DuplicateRequest(key.to_string()));
        }

        records.insert(
            key.to_string(),
            IdempotencyRecord {
                outcome: None,
                expires_at: now + self.config.ttl,
            },
        );
        Ok(())
    }

    /// Finalizes the record for `key` and restarts its retention window.
    pub async fn save(&self, key: &str, result: SettlementResult) {
        let mut records = self.records.lock().await;
        records.insert(
            key.to_string(),
            IdempotencyRecord {
                outcome: Some(result),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
    }

    /// Drops a pending reservation after a pre-enqueue rejection, so the key
    /// is not poisoned by a submission that was never accepted.
    pub async fn release(&self, key: &str) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(key) {
            if record.outcome.is_none() {
                records.remove(key);
            }
        }
    }

    /// Stored outcome for `key`, if finalized and unexpired.
    pub async fn get(&self, key: &str) -> Option<SettlementResult> {
        let records = self.records.lock().await;
        records
            .get(key)
            .filter(|record| record.expires_at > Instant::now())
            .and_then(|record| record.outcome.clone())
    }
}
