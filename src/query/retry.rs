use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::api::ApiError;

/// Decides whether a failed attempt may be retried.
pub type RetryClassifier = fn(&ApiError) -> bool;

/// Bounded exponential backoff, injected per query.
///
/// `max_attempts` counts every attempt including the first, so
/// `max_attempts == 1` disables retries. The delay before attempt `n + 1` is
/// `backoff_base * backoff_multiplier^(n - 1)`, capped at `max_backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub classifier: RetryClassifier,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_multiplier: 2.0,
            max_backoff: DEFAULT_MAX_BACKOFF,
            classifier: ApiError::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64) -> Self {
        self.backoff_base = base;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Delay to wait after the `failed_attempts`-th failure (1-based).
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(30) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let millis = self.backoff_base.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `err` on attempt `attempt` (1-based).
    pub fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.classifier)(err)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.max_attempts == 0 {
            return Err(ApiError::validation("retry policy needs at least one attempt"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ApiError::validation(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Runs `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        warn!("{} failed after {} attempts: {}", label, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
