//! # Query Cache
//!
//! In-memory, process-lifetime request/response cache, similar to SWR or
//! TanStack Query.
//!
//! - [`key`]: `CacheKey`, canonical addressing of cached units
//! - [`entry`]: `CacheEntry` and the `QuerySnapshot` readers see
//! - [`cache`]: `QueryCache` with dedup, ordering, invalidation and eviction
//! - [`handle`]: `QueryHandle`, the subscribable view with polling
//! - [`options`] / [`retry`]: per-query configuration
//! - [`clock`]: injectable time source

pub mod cache;
pub mod clock;
pub mod entry;
pub mod handle;
pub mod key;
pub mod options;
pub mod retry;

pub use cache::{Callback, DEFAULT_CAPACITY, Fetcher, QueryCache, Subscription, fetcher};
pub use clock::{Clock, SystemClock};
pub use entry::{CacheEntry, EntryStatus, QuerySnapshot};
pub use handle::QueryHandle;
pub use key::CacheKey;
pub use options::QueryOptions;
pub use retry::RetryPolicy;
