//! # Query Catalogue
//!
//! One [`QuerySpec`] per read endpoint and one [`Mutation`] per write, with
//! the keys, freshness windows and `enabled` gates the app uses.
//!
//! | Query            | Key                               | Stale for | Enabled when         |
//! |------------------|-----------------------------------|-----------|----------------------|
//! | `health`         | `["health"]`                      | 0         | always, polled 30s   |
//! | `movies`         | `["movies", {filters}]`           | 5 min     | always               |
//! | `movie`          | `["movie", id]`                   | 0         | id non-empty         |
//! | `search_movies`  | `["movies", "search", q]`         | 2 min     | q has 3+ characters  |
//! | `featured`       | `["movies", "featured"]`          | 10 min    | always               |
//! | `user_progress`  | `["progress", user]`              | 0         | user non-empty       |
//! | `progress_stats` | `["progress", user, "stats"]`     | 0         | token present        |
//! | `current_user`   | `["user", "current"]`             | 0         | token present        |
//! | `subtitles`      | `["subtitles", id, lang]`         | 0         | id non-empty         |
//! | `categories`     | `["categories"]`                  | 30 min    | always               |
//! | `languages`      | `["languages"]`                   | 30 min    | always               |

use std::time::Duration;

use serde_json::json;

use crate::api::endpoints::{self, DEFAULT_SEARCH_LIMIT};
use crate::api::types::{LoginData, MovieParams, ProgressUpdate, RegisterData};
use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::health::{MonitorOptions, health_key};
use crate::mutation::{Mutation, MutationOptions};
use crate::query::{CacheKey, Fetcher, QueryCache, QueryHandle, QueryOptions, QuerySnapshot, fetcher};

pub const MOVIES_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const SEARCH_STALE_TIME: Duration = Duration::from_secs(2 * 60);
pub const FEATURED_STALE_TIME: Duration = Duration::from_secs(10 * 60);
pub const REFERENCE_STALE_TIME: Duration = Duration::from_secs(30 * 60);

/// Searches shorter than this are not sent.
pub const MIN_SEARCH_LENGTH: usize = 3;

/// Everything needed to run one cached read.
#[derive(Clone)]
pub struct QuerySpec {
    pub key: CacheKey,
    pub fetcher: Fetcher,
    pub options: QueryOptions,
}

impl QuerySpec {
    fn new(api: &ApiClient, key: CacheKey, request: ApiRequest) -> Self {
        Self {
            key,
            fetcher: request_fetcher(api, request),
            options: QueryOptions::default(),
        }
    }

    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.options = self.options.stale_time(stale_time);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options = self.options.enabled(enabled);
        self
    }

    /// Reads through the cache and waits for the result.
    pub async fn fetch(&self, cache: &QueryCache) -> Result<QuerySnapshot, ApiError> {
        cache.fetch(&self.key, self.fetcher.clone(), &self.options).await
    }

    /// Opens a live handle on the query.
    pub fn watch(self, cache: &QueryCache) -> Result<QueryHandle, ApiError> {
        cache.query(self.key, self.fetcher, self.options)
    }
}

/// Wraps one request in a fetcher that re-sends it on every call.
pub fn request_fetcher(api: &ApiClient, request: ApiRequest) -> Fetcher {
    let api = api.clone();
    fetcher(move || {
        let api = api.clone();
        let request = request.clone();
        async move { api.execute(request).await }
    })
}

fn present(token: Option<&str>) -> Option<&str> {
    token.filter(|t| !t.trim().is_empty())
}

// ============================================================================
// Reads
// ============================================================================

/// The health probe. Polling and retry come from `options`.
pub fn health(api: &ApiClient, options: &MonitorOptions) -> QuerySpec {
    let mut spec = QuerySpec::new(api, health_key(), endpoints::health_check());
    spec.options = options.query_options();
    spec
}

pub fn movies(api: &ApiClient, params: &MovieParams) -> QuerySpec {
    let filters = json!({
        "page": params.page,
        "limit": params.limit,
        "language": params.language,
        "difficulty": params.difficulty,
        "genre": params.genre,
    });
    QuerySpec::new(api, CacheKey::new("movies").with(filters), endpoints::movies(params))
        .stale_time(MOVIES_STALE_TIME)
}

pub fn movie(api: &ApiClient, movie_id: &str, token: Option<&str>) -> QuerySpec {
    QuerySpec::new(
        api,
        CacheKey::new("movie").with(movie_id),
        endpoints::movie(movie_id, present(token)),
    )
    .enabled(!movie_id.is_empty())
}

pub fn search_movies(api: &ApiClient, query: &str) -> QuerySpec {
    QuerySpec::new(
        api,
        CacheKey::new("movies").with("search").with(query),
        endpoints::search_movies(query, DEFAULT_SEARCH_LIMIT),
    )
    .stale_time(SEARCH_STALE_TIME)
    .enabled(query.chars().count() >= MIN_SEARCH_LENGTH)
}

pub fn featured_movies(api: &ApiClient) -> QuerySpec {
    QuerySpec::new(api, CacheKey::new("movies").with("featured"), endpoints::featured_movies())
        .stale_time(FEATURED_STALE_TIME)
}

pub fn user_progress(api: &ApiClient, user_id: &str) -> QuerySpec {
    QuerySpec::new(api, progress_key(user_id), endpoints::user_progress(user_id))
        .enabled(!user_id.is_empty())
}

/// Stats live under the user's progress prefix so a progress update
/// invalidates both.
pub fn progress_stats(api: &ApiClient, user_id: &str, token: Option<&str>) -> QuerySpec {
    let token = present(token);
    QuerySpec::new(
        api,
        progress_key(user_id).with("stats"),
        endpoints::progress_stats(token.unwrap_or_default()),
    )
    .enabled(token.is_some())
}

pub fn current_user(api: &ApiClient, token: Option<&str>) -> QuerySpec {
    let token = present(token);
    QuerySpec::new(
        api,
        CacheKey::new("user").with("current"),
        endpoints::current_user(token.unwrap_or_default()),
    )
    .enabled(token.is_some())
}

pub fn subtitles(api: &ApiClient, movie_id: &str, language: &str) -> QuerySpec {
    QuerySpec::new(
        api,
        CacheKey::new("subtitles").with(movie_id).with(language),
        endpoints::subtitles(movie_id, language),
    )
    .enabled(!movie_id.is_empty())
}

pub fn categories(api: &ApiClient) -> QuerySpec {
    QuerySpec::new(api, CacheKey::new("categories"), endpoints::categories())
        .stale_time(REFERENCE_STALE_TIME)
}

pub fn languages(api: &ApiClient) -> QuerySpec {
    QuerySpec::new(api, CacheKey::new("languages"), endpoints::languages())
        .stale_time(REFERENCE_STALE_TIME)
}

pub fn progress_key(user_id: &str) -> CacheKey {
    CacheKey::new("progress").with(user_id)
}

// ============================================================================
// Writes
// ============================================================================

pub fn login(cache: &QueryCache, api: &ApiClient) -> Mutation<LoginData> {
    let api = api.clone();
    Mutation::new(
        cache.clone(),
        move |data: LoginData| {
            let api = api.clone();
            async move { api.execute(endpoints::login(&data)?).await }
        },
        MutationOptions::default(),
    )
}

pub fn register(cache: &QueryCache, api: &ApiClient) -> Mutation<RegisterData> {
    let api = api.clone();
    Mutation::new(
        cache.clone(),
        move |data: RegisterData| {
            let api = api.clone();
            async move { api.execute(endpoints::register(&data)?).await }
        },
        MutationOptions::default(),
    )
}

/// Records watch progress, then marks the user's progress and stats stale.
pub fn update_progress(cache: &QueryCache, api: &ApiClient, user_id: &str, token: &str) -> Mutation<ProgressUpdate> {
    let api = api.clone();
    let token = token.to_string();
    Mutation::new(
        cache.clone(),
        move |update: ProgressUpdate| {
            let api = api.clone();
            let token = token.clone();
            async move { api.execute(endpoints::update_progress(&update, &token)?).await }
        },
        MutationOptions::default().invalidates(progress_key(user_id)),
    )
}
