//! # Mutations
//!
//! One-shot writes. A mutation runs its function exactly once: no dedup and no
//! retry, since replaying a write could duplicate its side effect. On success
//! every related key prefix is invalidated in the [`QueryCache`], so the next
//! read refetches in the background while still serving the old value.
//!
//! ```text
//! mutate(input) ──► fn(input) ──ok──► invalidate_prefix(related_keys) ──► on_success
//!                        │
//!                        └─err──► state = Error (cache untouched)
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, warn};
use serde_json::Value;

use crate::api::ApiError;
use crate::query::{CacheKey, QueryCache};

type MutationFn<I> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

/// Called with the server's response after a successful mutation.
pub type SuccessHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// The state of the most recent `mutate` call.
#[derive(Debug, Clone, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Loading,
    Success(Arc<Value>),
    Error(ApiError),
}

impl MutationState {
    pub fn data(&self) -> Option<&Value> {
        match self {
            MutationState::Success(data) => Some(data.as_ref()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            MutationState::Error(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self, MutationState::Loading)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, MutationState::Success(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, MutationState::Error(_))
    }
}

#[derive(Clone, Default)]
pub struct MutationOptions {
    /// Key prefixes invalidated after a successful write.
    pub related_keys: Vec<CacheKey>,
    pub on_success: Option<SuccessHook>,
}

impl MutationOptions {
    #[must_use]
    pub fn invalidates(mut self, prefix: CacheKey) -> Self {
        self.related_keys.push(prefix);
        self
    }

    #[must_use]
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }
}

/// A write operation bound to a cache, exposing the
/// `{mutate(input), is_loading, is_error}` contract.
pub struct Mutation<I> {
    cache: QueryCache,
    mutation_fn: MutationFn<I>,
    options: MutationOptions,
    state: Arc<Mutex<MutationState>>,
}

impl<I: Send + 'static> Mutation<I> {
    pub fn new<F, Fut>(cache: QueryCache, mutation_fn: F, options: MutationOptions) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        Self {
            cache,
            mutation_fn: Arc::new(move |input| mutation_fn(input).boxed()),
            options,
            state: Arc::new(Mutex::new(MutationState::Idle)),
        }
    }

    /// Runs the write once and, on success, invalidates related keys.
    pub async fn mutate(&self, input: I) -> Result<Arc<Value>, ApiError> {
        self.set_state(MutationState::Loading);

        match (self.mutation_fn)(input).await {
            Ok(value) => {
                let value = Arc::new(value);
                self.set_state(MutationState::Success(value.clone()));
                for prefix in &self.options.related_keys {
                    let count = self.cache.invalidate_prefix(prefix);
                    debug!("mutation invalidated {} entries under {}", count, prefix);
                }
                if let Some(hook) = &self.options.on_success {
                    hook(&value);
                }
                Ok(value)
            }
            Err(err) => {
                warn!("mutation failed: {}", err);
                self.set_state(MutationState::Error(err.clone()));
                Err(err)
            }
        }
    }

    pub fn state(&self) -> MutationState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn is_error(&self) -> bool {
        self.state().is_error()
    }

    /// Back to `Idle`, e.g. when a form is dismissed.
    pub fn reset(&self) {
        self.set_state(MutationState::Idle);
    }

    fn set_state(&self, next: MutationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryOptions;
    use crate::test_support::CountingFetcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_mutation_state_predicates() {
        let idle = MutationState::default();
        assert!(!idle.is_loading() && !idle.is_success() && !idle.is_error());
        assert!(MutationState::Loading.is_loading());
        let ok = MutationState::Success(Arc::new(json!(1)));
        assert_eq!(ok.data(), Some(&json!(1)));
        let err = MutationState::Error(ApiError::http(400, "bad"));
        assert!(err.is_error());
        assert_eq!(err.error(), Some(&ApiError::http(400, "bad")));
    }

    #[tokio::test]
    async fn test_success_invalidates_related_prefix_only() {
        let cache = QueryCache::default();
        let options = QueryOptions::default().stale_time(Duration::from_secs(300));
        let stats = CacheKey::new("progress").with("u1").with("stats");
        let movies = CacheKey::new("movies");
        for key in [&stats, &movies] {
            cache
                .fetch(key, CountingFetcher::ok(json!(1)).fetcher(), &options)
                .await
                .unwrap();
        }

        let hooked = Arc::new(AtomicUsize::new(0));
        let hooked_cb = hooked.clone();
        let mutation = Mutation::new(
            cache.clone(),
            |percent: u32| async move { Ok(json!({"progress": percent})) },
            MutationOptions::default()
                .invalidates(CacheKey::new("progress").with("u1"))
                .on_success(move |_| {
                    hooked_cb.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let value = mutation.mutate(40).await.unwrap();
        assert_eq!(value.as_ref(), &json!({"progress": 40}));
        assert!(mutation.state().is_success());
        assert_eq!(hooked.load(Ordering::SeqCst), 1);
        assert!(cache.get(&stats).is_stale());
        assert_eq!(cache.get(&stats).data(), Some(&json!(1)));
        assert!(!cache.get(&movies).is_stale());
    }

    #[tokio::test]
    async fn test_failure_runs_once_and_leaves_cache_alone() {
        let cache = QueryCache::default();
        let key = CacheKey::new("progress").with("u1");
        cache
            .fetch(&key, CountingFetcher::ok(json!(1)).fetcher(), &QueryOptions::default().stale_time(Duration::from_secs(300)))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_fn = calls.clone();
        let mutation = Mutation::new(
            cache.clone(),
            move |_: ()| {
                calls_fn.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::http(503, "unavailable")) }
            },
            MutationOptions::default().invalidates(key.clone()),
        );

        let result = mutation.mutate(()).await;
        assert_eq!(result, Err(ApiError::http(503, "unavailable")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(mutation.is_error());
        assert!(!cache.get(&key).is_stale());

        mutation.reset();
        assert!(!mutation.is_error());
        assert!(!mutation.is_loading());
    }
}
