use crate::config::BreakerConfig;
use crate::error::{PaymentError, Result};
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker guarding one ledger backend instance.
///
/// All concurrent transfer attempts share one breaker; a single mutex holds
/// the authoritative state so callers observe transitions atomically. While
/// `Closed`, call outcomes accumulate in a rolling sample window; once the
/// failure rate over at least `min_samples` outcomes reaches the threshold,
/// the breaker trips to `Open` and calls fail fast with `CircuitOpen` without
/// invoking the backend. After the cooldown the next caller is admitted as a
/// half-open trial: its success closes the breaker, its failure restarts the
/// cooldown.
///
/// Only backend-health failures (`BackendUnavailable`, which includes the
/// per-call timeout) count against the window. Business rejections such as
/// `InsufficientFunds` mean the backend answered and leave the breaker alone.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: BreakerState,
    /// Outcomes within the sample window, oldest first. `true` = success.
    window: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Runs `op` under the breaker's admission control and hard timeout.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit().await?;

        let result = match timeout(self.config.call_timeout, op()).await {
            Ok(inner) => inner,
            Err(_) => Err(PaymentError::backend_unavailable(format!(
                "call exceeded {:?} timeout",
                self.config.call_timeout
            ))),
        };

        let healthy = !matches!(result, Err(PaymentError::BackendUnavailable(_)));
        self.record(healthy).await;
        result
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    async fn admit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or_default();
                if elapsed < self.config.reset_after {
                    return Err(PaymentError::CircuitOpen);
                }
                debug!("cooldown elapsed, admitting half-open trial");
                inner.state = BreakerState::HalfOpen;
                inner.half_open_in_flight = 1;
                Ok(())
            }
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_max_calls {
                    return Err(PaymentError::CircuitOpen);
                }
                inner.half_open_in_flight += 1;
                Ok(())
            }
        }
    }

    async fn record(&self, success: bool) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => {
                inner.window.push_back((now, success));
                let horizon = now.checked_sub(self.config.sample_window);
                while let Some(&(at, _)) = inner.window.front() {
                    match horizon {
                        Some(h) if at < h => inner.window.pop_front(),
                        _ => break,
                    };
                }

                let samples = inner.window.len() as u32;
                if samples < self.config.min_samples {
                    return;
                }
                let failures = inner.window.iter().filter(|(_, ok)| !ok).count() as u32;
                if failures * 100 >= self.config.error_threshold_pct * samples {
                    warn!(failures, samples, "failure rate over threshold, opening circuit");
                    Self::trip(&mut inner, now);
                }
            }
            BreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                if success {
                    debug!("half-open trial succeeded, closing circuit");
                    inner.state = BreakerState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                } else {
                    warn!("half-open trial failed, reopening circuit");
                    Self::trip(&mut inner, now);
                }
            }
            // A call admitted before the trip may report after it; the
            // outcome is stale and must not perturb the cooldown.
            BreakerState::Open => {}
        }
    }

    fn trip(inner: &mut BreakerInner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        inner.window.clear();
        inner.half_open_in_flight = 0;
    }
}
