//! Bounded retry with backoff, and a consecutive-failure circuit breaker.
//!
//! ```rust,ignore
//! let policy = RetryPolicy::detail(&config.detail);
//! let fields = with_retry(&policy, move || source.fetch_detail(id)).await;
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use companyinfo_shared::{ClassificationConfig, DetailConfig, FailureKind, Result};

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Attempt budget and backoff for one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero behaves as one.
    pub max_attempts: u32,
    /// Timeouts and transient failures wait `linear_step * (attempt + 1)`.
    pub linear_step: Duration,
    /// Overload signals wait `exponential_base * 2^attempt`.
    pub exponential_base: Duration,
}

impl RetryPolicy {
    /// Detail-page loads.
    pub fn detail(config: &DetailConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            linear_step: config.retry_step(),
            exponential_base: config.retry_step(),
        }
    }

    /// Classification-service calls.
    pub fn classification(config: &ClassificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            linear_step: config.backoff_base(),
            exponential_base: config.backoff_base(),
        }
    }

    /// Delay after failed attempt `attempt` (0-based); `None` when the
    /// failure is terminal.
    pub fn delay_for(&self, kind: FailureKind, attempt: u32) -> Option<Duration> {
        match kind {
            FailureKind::Terminal => None,
            FailureKind::Timeout | FailureKind::Transient => {
                Some(self.linear_step.saturating_mul(attempt.saturating_add(1)))
            }
            FailureKind::Overloaded => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                Some(self.exponential_base.saturating_mul(factor))
            }
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or the attempt
/// budget is spent. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let kind = e.failure_kind();
                if !kind.is_retryable() {
                    debug!(error = %e, "terminal failure, not retrying");
                    return Err(e);
                }

                if attempt + 1 >= max_attempts {
                    warn!(error = %e, attempts = max_attempts, "retry budget exhausted");
                    return Err(e);
                }

                let delay = policy.delay_for(kind, attempt).unwrap_or_default();
                warn!(
                    error = %e,
                    kind = ?kind,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Opens after `threshold` consecutive failed items. A threshold of zero
/// never opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed item. Returns `true` when this failure opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        let was_open = self.is_open();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        !was_open && self.is_open()
    }

    pub fn is_open(&self) -> bool {
        self.threshold > 0 && self.consecutive_failures >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
