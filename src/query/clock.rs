use std::fmt::Debug;

use tokio::time::Instant;

/// Source of "now" for staleness decisions.
///
/// Uses tokio's `Instant` so paused-time tests and backoff sleeps agree.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
