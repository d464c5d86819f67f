//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::api::ApiError;
use crate::query::{Clock, Fetcher, fetcher};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}

/// Fetcher that answers immediately with a switchable result and counts calls.
#[derive(Clone)]
pub struct CountingFetcher {
    result: Arc<Mutex<Result<Value, ApiError>>>,
    calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn ok(value: Value) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(value))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn err(error: ApiError) -> Self {
        let counter = Self::ok(Value::Null);
        counter.fail_with(error);
        counter
    }

    pub fn fail_with(&self, error: ApiError) {
        *self.result.lock().unwrap() = Err(error);
    }

    pub fn succeed_with(&self, value: Value) {
        *self.result.lock().unwrap() = Ok(value);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetcher(&self) -> Fetcher {
        let result = self.result.clone();
        let calls = self.calls.clone();
        fetcher(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let outcome = result.lock().unwrap().clone();
            async move { outcome }
        })
    }
}

/// Fetcher whose calls block until [`GatedFetcher::open`] is called.
#[derive(Clone)]
pub struct GatedFetcher {
    value: Value,
    gate: Arc<watch::Sender<bool>>,
    calls: Arc<AtomicUsize>,
}

impl GatedFetcher {
    pub fn new(value: Value) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            value,
            gate: Arc::new(gate),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetcher(&self) -> Fetcher {
        let value = self.value.clone();
        let gate = self.gate.clone();
        let calls = self.calls.clone();
        fetcher(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            let mut open = gate.subscribe();
            async move {
                let _ = open.wait_for(|is_open| *is_open).await;
                Ok(value)
            }
        })
    }
}
