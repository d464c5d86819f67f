use std::time::Duration;

use crate::api::ApiError;

use super::retry::RetryPolicy;

/// Per-query behavior.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// How long fetched data is served without touching the network.
    pub stale_time: Duration,
    pub retry: RetryPolicy,
    /// `false` suppresses fetching entirely (e.g. auth-gated queries without a token).
    pub enabled: bool,
    /// Forced refetch period for handles, independent of staleness.
    pub poll_interval: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO, // immediately stale
            retry: RetryPolicy::default(),
            enabled: true,
            poll_interval: None,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.poll_interval.is_some_and(|p| p.is_zero()) {
            return Err(ApiError::validation("poll interval must be non-zero"));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = QueryOptions::default();
        assert_eq!(options.stale_time, Duration::ZERO);
        assert!(options.enabled);
        assert!(options.poll_interval.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let options = QueryOptions::default().poll_interval(Duration::ZERO);
        assert!(matches!(options.validate(), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn test_invalid_retry_policy_rejected() {
        let options = QueryOptions::default().retry(RetryPolicy::default().with_max_attempts(0));
        assert!(options.validate().is_err());
    }
}
