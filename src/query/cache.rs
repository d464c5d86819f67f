//! # Query Cache
//!
//! Maps canonical keys to cached results and owns everything around them:
//! staleness, dedup of concurrent fetches, retry, ordering of completions,
//! subscriber notification and eviction.
//!
//! ```text
//! fetch(key) ──► fresh entry? ──yes──► snapshot (no network)
//!                    │ no
//!                    ▼
//!            registered in-flight? ──yes──► attach to its shared future
//!                    │ no
//!                    ▼
//!            spawn fetch #seq ──► retry loop ──► complete(key, seq)
//!                                                   │
//!                      seq > applied? ──no──► discard
//!                                │ yes
//!                                ▼
//!                      replace entry, notify subscribers
//! ```
//!
//! All shared state sits behind one `Mutex` that is never held across an
//! `.await`; subscriber callbacks run after it is released. Each change is
//! stamped with a revision under that lock, and a per-key delivery lock hands
//! changes to subscribers in revision order, dropping any that were overtaken.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, info};
use serde_json::Value;

use crate::api::ApiError;

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, EntryStatus, QuerySnapshot};
use super::key::CacheKey;
use super::options::QueryOptions;

/// Produces the value for a key. Called once per attempt.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

/// Notified with the new snapshot whenever the subscribed key's entry changes.
///
/// Callbacks for one key run one at a time, oldest change first, and a change
/// already superseded by a newer delivery is skipped. A callback must not
/// fetch or invalidate its own key synchronously.
pub type Callback = Arc<dyn Fn(&QuerySnapshot) + Send + Sync>;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>, ApiError>>>;

pub const DEFAULT_CAPACITY: usize = 256;

/// Wraps an async closure as a [`Fetcher`].
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

struct InFlight {
    seq: u64,
    future: SharedFetch,
}

/// Everything the cache knows about one canonical key.
#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
    /// Highest sequence number whose completion has been applied.
    applied_seq: u64,
    /// Fetches with `seq <= invalidated_through` started before the last invalidation.
    invalidated_through: u64,
    subscribers: Vec<(u64, Callback)>,
    last_access: u64,
    /// Revision of the last notification handed to subscribers.
    delivered: Arc<Mutex<u64>>,
}

impl Slot {
    fn evictable(&self) -> bool {
        self.entry.is_some() && self.in_flight.is_none() && self.subscribers.is_empty()
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<String, Slot>,
    next_seq: u64,
    next_subscriber_id: u64,
    next_revision: u64,
    access_tick: u64,
}

impl State {
    fn touch(&mut self, key: &CacheKey) -> &mut Slot {
        self.access_tick += 1;
        let tick = self.access_tick;
        // fetches issued before this slot existed belong to an evicted one
        let floor = self.next_seq;
        let slot = self
            .slots
            .entry(key.as_str().to_string())
            .or_insert_with(|| Slot {
                applied_seq: floor,
                ..Slot::default()
            });
        slot.last_access = tick;
        slot
    }

    fn entry_count(&self) -> usize {
        self.slots.values().filter(|s| s.entry.is_some()).count()
    }
}

struct Inner {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

/// An explicit, injectable request/response cache.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Arc::new(SystemClock))
    }
}

impl QueryCache {
    /// `capacity` bounds the number of entries; least recently used entries
    /// with no subscribers and no fetch in flight are evicted beyond it.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                clock,
                capacity: capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> tokio::time::Instant {
        self.inner.clock.now()
    }

    /// Current snapshot for `key`, without fetching.
    pub fn get(&self, key: &CacheKey) -> QuerySnapshot {
        let state = self.lock();
        self.snapshot_of(&state, key)
    }

    fn snapshot_of(&self, state: &State, key: &CacheKey) -> QuerySnapshot {
        state
            .slots
            .get(key.as_str())
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| QuerySnapshot::of(entry, self.now()))
            .unwrap_or_else(|| QuerySnapshot::empty(key.clone()))
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh entry as-is, otherwise fetches (or joins the fetch in
    /// flight) and returns the snapshot after it completes.
    ///
    /// Only caller misuse is reported as `Err`; fetch failures are in the snapshot.
    pub async fn fetch(
        &self,
        key: &CacheKey,
        fetcher: Fetcher,
        options: &QueryOptions,
    ) -> Result<QuerySnapshot, ApiError> {
        key.validate()?;
        options.validate()?;
        if !options.enabled {
            return Ok(self.get(key));
        }
        if let Some(future) = self.ensure(key, fetcher, options, false) {
            let _ = future.await;
        }
        Ok(self.get(key))
    }

    /// Like [`QueryCache::fetch`] but ignores freshness. Still joins a fetch
    /// already in flight instead of issuing a duplicate.
    pub async fn refetch(
        &self,
        key: &CacheKey,
        fetcher: Fetcher,
        options: &QueryOptions,
    ) -> Result<QuerySnapshot, ApiError> {
        key.validate()?;
        options.validate()?;
        if !options.enabled {
            return Ok(self.get(key));
        }
        if let Some(future) = self.ensure(key, fetcher, options, true) {
            let _ = future.await;
        }
        Ok(self.get(key))
    }

    /// Starts or joins a fetch unless the entry is fresh (and `force` is off).
    /// Returns the future to await, or `None` when the cached entry was served.
    pub(crate) fn ensure(
        &self,
        key: &CacheKey,
        fetcher: Fetcher,
        options: &QueryOptions,
        force: bool,
    ) -> Option<SharedFetch> {
        let now = self.now();
        let (future, notify) = {
            let mut state = self.lock();
            let slot = state.touch(key);

            if !force && slot.entry.as_ref().is_some_and(|e| e.is_fresh(now)) {
                debug!("cache hit: {}", key);
                return None;
            }
            if let Some(in_flight) = &slot.in_flight {
                debug!("joining in-flight fetch #{} for {}", in_flight.seq, key);
                return Some(in_flight.future.clone());
            }

            state.next_seq += 1;
            let seq = state.next_seq;
            let future = self.spawn_fetch(key.clone(), seq, fetcher, options.clone());

            let slot = state.touch(key);
            slot.in_flight = Some(InFlight {
                seq,
                future: future.clone(),
            });
            slot.entry = Some(match &slot.entry {
                Some(entry) => entry.fetching(),
                None => CacheEntry::pending(key.clone()),
            });
            debug!("fetch #{} started for {}", seq, key);

            self.evict_over_capacity(&mut state);
            (future, self.notification(&mut state, key))
        };
        notify.deliver();
        Some(future)
    }

    fn spawn_fetch(&self, key: CacheKey, seq: u64, fetcher: Fetcher, options: QueryOptions) -> SharedFetch {
        let cache = self.clone();
        let label = key.to_string();
        let failed_label = label.clone();
        let task = tokio::spawn(async move {
            let result = options
                .retry
                .run(&label, || fetcher())
                .await
                .map(Arc::new);
            cache.complete(&key, seq, &options, result)
        });
        async move {
            task.await
                .unwrap_or_else(|e| Err(ApiError::network(failed_label, format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Applies a finished fetch if it is the newest to complete for its key.
    fn complete(
        &self,
        key: &CacheKey,
        seq: u64,
        options: &QueryOptions,
        result: Result<Arc<Value>, ApiError>,
    ) -> Result<Arc<Value>, ApiError> {
        let now = self.now();
        let notify = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key.as_str()) else {
                debug!("discarding fetch #{} for {}: entry was evicted", seq, key);
                return result;
            };

            if slot.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
                slot.in_flight = None;
            }
            if seq <= slot.applied_seq {
                debug!(
                    "discarding fetch #{} for {}: #{} already applied",
                    seq, key, slot.applied_seq
                );
                return result;
            }
            slot.applied_seq = seq;

            let base = slot
                .entry
                .clone()
                .unwrap_or_else(|| CacheEntry::pending(key.clone()));
            let mut next = match &result {
                Ok(data) => {
                    let fresh = seq > slot.invalidated_through;
                    base.resolved(data.clone(), now, options.stale_time, fresh)
                }
                Err(err) => {
                    info!("query {} failed: {}", key, err);
                    base.failed(err.clone())
                }
            };
            // a newer fetch is still running for this key
            if slot.in_flight.is_some() && next.status != EntryStatus::Error {
                next = next.with_status(EntryStatus::Fetching);
            }
            slot.entry = Some(next);
            self.notification(&mut state, key)
        };
        notify.deliver();
        result
    }

    /// Marks the entry for `key` stale without dropping its data. A fetch in
    /// flight is detached: its result can no longer land as fresh and the next
    /// read issues a new fetch.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.invalidate_where(|k| k == key) > 0
    }

    /// Invalidates every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &CacheKey) -> usize {
        self.invalidate_where(|k| k.starts_with(prefix))
    }

    fn invalidate_where(&self, matches: impl Fn(&CacheKey) -> bool) -> usize {
        let now = self.now();
        let notifications: Vec<Notification> = {
            let mut state = self.lock();
            let through = state.next_seq;
            let mut keys = Vec::new();
            for slot in state.slots.values_mut() {
                let Some(entry) = &slot.entry else { continue };
                if !matches(&entry.key) {
                    continue;
                }
                let key = entry.key.clone();
                slot.entry = Some(entry.invalidated(now));
                slot.invalidated_through = through;
                if let Some(detached) = slot.in_flight.take() {
                    debug!("detached in-flight fetch #{} for {}", detached.seq, key);
                }
                keys.push(key);
            }
            keys.iter().map(|key| self.notification(&mut state, key)).collect()
        };
        let count = notifications.len();
        if count > 0 {
            info!("invalidated {} cache entries", count);
        }
        for notify in notifications {
            notify.deliver();
        }
        count
    }

    /// Registers `callback` for changes to `key`. Dropping the returned
    /// [`Subscription`] unsubscribes; it never cancels a fetch.
    pub fn subscribe(&self, key: &CacheKey, callback: Callback) -> Subscription {
        let mut state = self.lock();
        self.register(&mut state, key, callback)
    }

    /// Like [`QueryCache::subscribe`], and also delivers the current snapshot
    /// in order with every other change to `key`. The key's other subscribers
    /// see that snapshot again.
    pub fn subscribe_with_current(&self, key: &CacheKey, callback: Callback) -> Subscription {
        let (subscription, notify) = {
            let mut state = self.lock();
            let subscription = self.register(&mut state, key, callback);
            (subscription, self.notification(&mut state, key))
        };
        notify.deliver();
        subscription
    }

    fn register(&self, state: &mut State, key: &CacheKey, callback: Callback) -> Subscription {
        state.next_subscriber_id += 1;
        let id = state.next_subscriber_id;
        state.touch(key).subscribers.push((id, callback));
        Subscription {
            cache: Arc::downgrade(&self.inner),
            key: key.as_str().to_string(),
            id,
        }
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.lock()
            .slots
            .get(key.as_str())
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Whether a fetch is registered as in flight for `key`.
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.lock()
            .slots
            .get(key.as_str())
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    fn notification(&self, state: &mut State, key: &CacheKey) -> Notification {
        state.next_revision += 1;
        let revision = state.next_revision;
        let (callbacks, delivered) = match state.slots.get(key.as_str()) {
            Some(slot) => (
                slot.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
                Some(slot.delivered.clone()),
            ),
            None => (Vec::new(), None),
        };
        Notification {
            revision,
            snapshot: self.snapshot_of(state, key),
            callbacks,
            delivered,
        }
    }

    fn evict_over_capacity(&self, state: &mut State) {
        while state.entry_count() > self.inner.capacity {
            let victim = state
                .slots
                .iter()
                .filter(|(_, slot)| slot.evictable())
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    debug!("evicting least recently used entry {}", key);
                    state.slots.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Snapshot plus the callbacks to hand it to, collected under the lock and
/// delivered after it is released.
struct Notification {
    revision: u64,
    snapshot: QuerySnapshot,
    callbacks: Vec<Callback>,
    delivered: Option<Arc<Mutex<u64>>>,
}

impl Notification {
    fn deliver(self) {
        let Some(delivered) = &self.delivered else { return };
        if self.callbacks.is_empty() {
            return;
        }
        let mut last = delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if self.revision <= *last {
            debug!(
                "skipping notification r{} for {}: r{} already delivered",
                self.revision, self.snapshot.key, *last
            );
            return;
        }
        *last = self.revision;
        for callback in &self.callbacks {
            callback(&self.snapshot);
        }
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    cache: Weak<Inner>,
    key: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.cache.upgrade() else { return };
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = state.slots.get_mut(&self.key) {
            slot.subscribers.retain(|(id, _)| *id != self.id);
            if slot.entry.is_none() && slot.subscribers.is_empty() && slot.in_flight.is_none() {
                state.slots.remove(&self.key);
            }
        }
    }
}
