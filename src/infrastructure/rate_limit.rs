use crate::config::RateLimitConfig;
use crate::error::{PaymentError, Result};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window transaction budget per wallet.
///
/// Each wallet may consume up to `points` within any rolling `window`. The
/// whole check-and-consume runs under one lock, so concurrent requests for
/// the same wallet cannot double-spend budget.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one point for `wallet`, or fails with `RateLimitExceeded`.
    pub async fn consume(&self, wallet: &str) -> Result<()> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let stamps = windows.entry(wallet.to_string()).or_default();

        while let Some(&oldest) = stamps.front() {
            if now.duration_since(oldest) >= self.config.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() as u32 >= self.config.points {
            debug!(wallet, "transaction budget exhausted");
            return Err(PaymentError::RateLimitExceeded(wallet.to_string()));
        }

        stamps.push_back(now);
        Ok(())
    }

    /// Points still available to `wallet` in the current window.
    pub async fn remaining(&self, wallet: &str) -> u32 {
        let windows = self.windows.lock().await;
        let consumed = windows
            .get(wallet)
            .map(|stamps| {
                stamps
                    .iter()
                    .filter(|at| at.elapsed() < self.config.window)
                    .count() as u32
            })
            .unwrap_or(0);
        self.config.points.saturating_sub(consumed)
    }
}
