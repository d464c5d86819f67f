use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::api::ApiError;

use super::key::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Fresh,
    Stale,
    Fetching,
    Error,
}

/// A cached result. Entries are never edited in place: every transition builds
/// a new entry that replaces the old one under the cache lock.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data: Option<Arc<Value>>,
    pub fetched_at: Option<Instant>,
    pub stale_after: Option<Instant>,
    pub status: EntryStatus,
    pub last_error: Option<ApiError>,
}

impl CacheEntry {
    /// The entry created when the first fetch for a key starts.
    pub fn pending(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            fetched_at: None,
            stale_after: None,
            status: EntryStatus::Fetching,
            last_error: None,
        }
    }

    pub fn fetching(&self) -> Self {
        Self {
            status: EntryStatus::Fetching,
            ..self.clone()
        }
    }

    /// A successful fetch. `fresh == false` lands the data already stale
    /// (the fetch was issued before an invalidation of this key).
    pub fn resolved(&self, data: Arc<Value>, now: Instant, stale_time: Duration, fresh: bool) -> Self {
        let stale_after = if fresh { now + stale_time } else { now };
        Self {
            key: self.key.clone(),
            data: Some(data),
            fetched_at: Some(now),
            stale_after: Some(stale_after),
            status: if fresh { EntryStatus::Fresh } else { EntryStatus::Stale },
            last_error: None,
        }
    }

    /// A failed fetch keeps the last-known-good data.
    pub fn failed(&self, error: ApiError) -> Self {
        Self {
            status: EntryStatus::Error,
            last_error: Some(error),
            ..self.clone()
        }
    }

    pub fn invalidated(&self, now: Instant) -> Self {
        Self {
            stale_after: self.stale_after.map(|_| now),
            status: match self.status {
                EntryStatus::Error => EntryStatus::Error,
                _ => EntryStatus::Stale,
            },
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: EntryStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.data.is_some() && self.stale_after.is_some_and(|at| now < at)
    }

    /// Status as seen by readers: a `Fresh` entry past its window reads as `Stale`.
    pub fn effective_status(&self, now: Instant) -> EntryStatus {
        match self.status {
            EntryStatus::Fresh if !self.is_fresh(now) => EntryStatus::Stale,
            other => other,
        }
    }
}

/// What a subscriber or caller sees of one key at one instant.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub key: CacheKey,
    pub data: Option<Arc<Value>>,
    /// `None` until the first fetch for the key starts.
    pub status: Option<EntryStatus>,
    pub error: Option<ApiError>,
    pub fetched_at: Option<Instant>,
}

impl QuerySnapshot {
    pub fn empty(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            status: None,
            error: None,
            fetched_at: None,
        }
    }

    pub fn of(entry: &CacheEntry, now: Instant) -> Self {
        Self {
            key: entry.key.clone(),
            data: entry.data.clone(),
            status: Some(entry.effective_status(now)),
            error: entry.last_error.clone(),
            fetched_at: entry.fetched_at,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_deref()
    }

    /// Fetching with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == Some(EntryStatus::Fetching) && self.data.is_none()
    }

    /// Fetching, whether or not older data is being shown meanwhile.
    pub fn is_fetching(&self) -> bool {
        self.status == Some(EntryStatus::Fetching)
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(EntryStatus::Error)
    }

    pub fn is_stale(&self) -> bool {
        self.status == Some(EntryStatus::Stale)
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && !self.is_error()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Decodes the cached JSON into `T`; `Ok(None)` when nothing is cached yet.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, ApiError> {
        self.data
            .as_deref()
            .map(|v| T::deserialize(v).map_err(ApiError::from))
            .transpose()
    }
}
