use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ApiError;

use super::cache::{Callback, Fetcher, QueryCache, Subscription};
use super::entry::QuerySnapshot;
use super::key::CacheKey;
use super::options::QueryOptions;

/// A live view of one query: the `{data, is_loading, is_error, error, refetch}`
/// contract handed to UI code.
///
/// Dropping the handle unsubscribes and stops polling. A fetch already in
/// flight still completes and is cached.
pub struct QueryHandle {
    cache: QueryCache,
    key: CacheKey,
    fetcher: Fetcher,
    options: QueryOptions,
    updates: watch::Receiver<QuerySnapshot>,
    _subscription: Subscription,
    poll_task: Option<JoinHandle<()>>,
}

impl QueryCache {
    /// Subscribes to `key` and starts a background fetch unless the entry is
    /// fresh. Must be called from within a tokio runtime.
    pub fn query(
        &self,
        key: CacheKey,
        fetcher: Fetcher,
        options: QueryOptions,
    ) -> Result<QueryHandle, ApiError> {
        key.validate()?;
        options.validate()?;

        let (tx, mut updates) = watch::channel(QuerySnapshot::empty(key.clone()));
        let forward: Callback = Arc::new(move |snapshot: &QuerySnapshot| {
            tx.send_replace(snapshot.clone());
        });
        let subscription = self.subscribe_with_current(&key, forward);
        updates.borrow_and_update();

        let mut poll_task = None;
        if options.enabled {
            self.ensure(&key, fetcher.clone(), &options, false);
            if let Some(period) = options.poll_interval {
                poll_task = Some(self.spawn_poll(key.clone(), fetcher.clone(), options.clone(), period));
            }
        }

        Ok(QueryHandle {
            cache: self.clone(),
            key,
            fetcher,
            options,
            updates,
            _subscription: subscription,
            poll_task,
        })
    }

    fn spawn_poll(
        &self,
        key: CacheKey,
        fetcher: Fetcher,
        options: QueryOptions,
        period: Duration,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("polling {}", key);
                let _ = cache.refetch(&key, fetcher.clone(), &options).await;
            }
        })
    }
}

impl QueryHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.cache.get(&self.key)
    }

    /// Forces a fetch regardless of freshness, joining one already in flight.
    pub async fn refetch(&self) -> Result<QuerySnapshot, ApiError> {
        self.cache
            .refetch(&self.key, self.fetcher.clone(), &self.options)
            .await
    }

    /// Waits for the next change to this key's entry.
    pub async fn changed(&mut self) -> Option<QuerySnapshot> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    /// Waits until no fetch is in progress and returns that snapshot.
    pub async fn settled(&mut self) -> QuerySnapshot {
        loop {
            let snapshot = self.snapshot();
            if !snapshot.is_fetching() {
                return snapshot;
            }
            if self.updates.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}
