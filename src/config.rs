use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which ledger backend variant a process instance runs against.
///
/// Decoded once at startup; the selection is immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    #[default]
    Simulated,
    Sandbox,
    Production,
}

impl LedgerMode {
    /// Network label stamped on receipts and audit records.
    pub fn network(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl FromStr for LedgerMode {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simulated" => Ok(Self::Simulated),
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(PaymentError::config(format!(
                "unknown LEDGER_MODE `{other}` (expected simulated|sandbox|production)"
            ))),
        }
    }
}

/// Ledger backend selection and remote credentials.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl LedgerConfig {
    /// Remote modes need an endpoint and credentials before startup.
    pub fn validate(&self) -> Result<()> {
        if self.mode == LedgerMode::Simulated {
            return Ok(());
        }
        if self.endpoint.as_deref().is_none_or(str::is_empty) {
            return Err(PaymentError::config(format!(
                "LEDGER_ENDPOINT is required for mode `{}`",
                self.mode.network()
            )));
        }
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(PaymentError::config(format!(
                "LEDGER_API_KEY is required for mode `{}`",
                self.mode.network()
            )));
        }
        Ok(())
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Hard timeout per backend call; a timeout counts as a failure.
    pub call_timeout: Duration,
    /// Failure percentage over the sample window that trips the breaker.
    pub error_threshold_pct: u32,
    /// Cooldown before an open breaker admits half-open trial calls.
    pub reset_after: Duration,
    /// Rolling window over which call outcomes are sampled.
    pub sample_window: Duration,
    /// Minimum outcomes in the window before the threshold applies.
    pub min_samples: u32,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(8_000),
            error_threshold_pct: 50,
            reset_after: Duration::from_millis(15_000),
            sample_window: Duration::from_secs(10),
            min_samples: 5,
            half_open_max_calls: 1,
        }
    }
}

/// Job queue retry policy.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Attempts per job, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Drop completed jobs from the queue's job table.
    pub remove_on_complete: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(2_000),
            remove_on_complete: true,
        }
    }
}

impl QueueConfig {
    /// Delay before retry attempt `attempt` (2-based: the delay scheduled
    /// after attempt `attempt - 1` failed). Doubles per attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(2).min(31);
        self.backoff_base.saturating_mul(2u32.saturating_pow(exp))
    }

    /// Upper bound on one job's lifetime: every backoff delay plus a full
    /// call timeout per attempt, with slack for scheduling.
    pub fn total_retry_budget(&self, call_timeout: Duration) -> Duration {
        let mut budget = Duration::from_secs(5);
        for attempt in 2..=self.max_attempts {
            budget += self.backoff_for_attempt(attempt);
        }
        budget + call_timeout.saturating_mul(self.max_attempts.max(1))
    }
}

/// Per-wallet rate budget.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub points: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            points: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Idempotency record retention.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3_600),
        }
    }
}

/// Full pipeline configuration, assembled once at process start.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub breaker: BreakerConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub idempotency: IdempotencyConfig,
}

impl Config {
    /// Reads the recognized environment variables, falling back to defaults.
    ///
    /// Unparsable values are configuration errors, not silent fallbacks.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = read_env("LEDGER_MODE")? {
            config.ledger.mode = mode;
        }
        config.ledger.endpoint = std::env::var("LEDGER_ENDPOINT").ok();
        config.ledger.api_key = std::env::var("LEDGER_API_KEY").ok();

        if let Some(ms) = read_env::<u64>("BREAKER_TIMEOUT_MS")? {
            config.breaker.call_timeout = Duration::from_millis(ms);
        }
        if let Some(pct) = read_env("BREAKER_ERROR_THRESHOLD_PCT")? {
            config.breaker.error_threshold_pct = pct;
        }
        if let Some(ms) = read_env::<u64>("BREAKER_RESET_MS")? {
            config.breaker.reset_after = Duration::from_millis(ms);
        }
        if let Some(attempts) = read_env("QUEUE_MAX_ATTEMPTS")? {
            config.queue.max_attempts = attempts;
        }
        if let Some(ms) = read_env::<u64>("QUEUE_BACKOFF_BASE_MS")? {
            config.queue.backoff_base = Duration::from_millis(ms);
        }
        if let Some(points) = read_env("RATE_LIMIT_POINTS")? {
            config.rate_limit.points = points;
        }
        if let Some(secs) = read_env::<u64>("RATE_LIMIT_WINDOW_S")? {
            config.rate_limit.window = Duration::from_secs(secs);
        }
        if let Some(secs) = read_env::<u64>("IDEMPOTENCY_TTL_S")? {
            config.idempotency.ttl = Duration::from_secs(secs);
        }

        config.ledger.validate()?;
        Ok(config)
    }
}

fn read_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| PaymentError::config(format!("invalid {key} `{raw}`: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_mode_parsing() {
        assert_eq!("simulated".parse::<LedgerMode>().unwrap(), LedgerMode::Simulated);
        assert_eq!("sandbox".parse::<LedgerMode>().unwrap(), LedgerMode::Sandbox);
        assert_eq!("production".parse::<LedgerMode>().unwrap(), LedgerMode::Production);
        assert!("mainnet".parse::<LedgerMode>().is_err());
    }

    #[test]
    fn test_remote_mode_requires_endpoint_and_key() {
        let config = LedgerConfig {
            mode: LedgerMode::Sandbox,
            endpoint: None,
            api_key: Some("key".into()),
        };
        assert!(matches!(config.validate(), Err(PaymentError::Config(_))));

        let config = LedgerConfig {
            mode: LedgerMode::Sandbox,
            endpoint: Some("https://sandbox.example".into()),
            api_key: Some("key".into()),
        };
        assert!(config.validate().is_ok());

        assert!(LedgerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let queue = QueueConfig::default();
        assert_eq!(queue.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(queue.backoff_for_attempt(3), Duration::from_secs(4));
        assert_eq!(queue.backoff_for_attempt(4), Duration::from_secs(8));
        assert_eq!(queue.backoff_for_attempt(5), Duration::from_secs(16));
    }

    #[test]
    fn test_retry_budget_covers_schedule() {
        let queue = QueueConfig::default();
        let budget = queue.total_retry_budget(Duration::from_secs(8));
        // 30s of backoff + 40s of call timeouts + slack
        assert!(budget >= Duration::from_secs(70));
    }

    #[test]
    fn test_defaults_match_documented_surface() {
        let config = Config::default();
        assert_eq!(config.breaker.call_timeout, Duration::from_millis(8_000));
        assert_eq!(config.breaker.error_threshold_pct, 50);
        assert_eq!(config.breaker.reset_after, Duration::from_millis(15_000));
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.backoff_base, Duration::from_millis(2_000));
        assert_eq!(config.rate_limit.points, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.idempotency.ttl, Duration::from_secs(3_600));
    }
}
