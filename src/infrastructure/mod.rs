pub mod audit;
pub mod breaker;
pub mod idempotency;
pub mod queue;
pub mod rate_limit;
pub mod remote;
pub mod simulated;

use crate::config::{LedgerConfig, LedgerMode};
use crate::domain::ports::SharedLedger;
use crate::error::Result;
use std::sync::Arc;

/// Builds the single active ledger backend for this process.
///
/// The variant set is closed; selection happens once at startup and the
/// returned handle is immutable thereafter.
pub fn build_ledger(config: &LedgerConfig) -> Result<SharedLedger> {
    config.validate()?;
    match config.mode {
        LedgerMode::Simulated => Ok(Arc::new(simulated::SimulatedLedger::new())),
        LedgerMode::Sandbox | LedgerMode::Production => {
            let endpoint = config.endpoint.clone().unwrap_or_default();
            let api_key = config.api_key.clone().unwrap_or_default();
            Ok(Arc::new(remote::RemoteLedger::new(
                config.mode.network(),
                endpoint,
                api_key,
            )?))
        }
    }
}
