//! Request builders and typed wrappers for every endpoint the client consumes.
//!
//! Builders are free functions so the query catalogue can wrap the exact same
//! request in a cached fetcher; the `ApiClient` methods send them directly.

use super::client::{ApiClient, ApiRequest};
use super::error::ApiError;
use super::types::{
    AuthResponse, CategoryList, CurrentUser, FeaturedMovies, HealthStatus, LanguageList,
    LoginData, MovieDetail, MovieParams, MovieResponse, ProgressStats, ProgressUpdate,
    ProgressUpdateResponse, RegisterData, SearchResults, SubtitleList, UserProgressList,
};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_SUBTITLE_LANGUAGE: &str = "en";

// ============================================================================
// Request Builders
// ============================================================================

pub fn health_check() -> ApiRequest {
    ApiRequest::get("/health")
}

pub fn register(data: &RegisterData) -> Result<ApiRequest, ApiError> {
    Ok(ApiRequest::post("/auth/register").json(serde_json::to_value(data)?))
}

pub fn login(data: &LoginData) -> Result<ApiRequest, ApiError> {
    Ok(ApiRequest::post("/auth/login").json(serde_json::to_value(data)?))
}

pub fn current_user(token: &str) -> ApiRequest {
    ApiRequest::get("/auth/me").bearer(Some(token))
}

pub fn logout(token: &str) -> ApiRequest {
    ApiRequest::post("/auth/logout").bearer(Some(token))
}

pub fn movies(params: &MovieParams) -> ApiRequest {
    ApiRequest::get("/movies")
        .query_opt("page", params.page)
        .query_opt("limit", params.limit)
        .query_opt("language", params.language.as_deref())
        .query_opt("difficulty", params.difficulty.as_deref())
        .query_opt("genre", params.genre.as_deref())
}

/// Authenticated lookups include the caller's progress on the movie.
pub fn movie(movie_id: &str, token: Option<&str>) -> ApiRequest {
    ApiRequest::get(format!("/movies/{movie_id}")).bearer(token)
}

pub fn search_movies(query: &str, limit: u32) -> ApiRequest {
    ApiRequest::get("/movies/search")
        .query("q", query)
        .query("limit", limit)
}

pub fn featured_movies() -> ApiRequest {
    ApiRequest::get("/movies/featured")
}

pub fn user_progress(user_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/users/{user_id}/progress"))
}

pub fn update_progress(data: &ProgressUpdate, token: &str) -> Result<ApiRequest, ApiError> {
    Ok(ApiRequest::post("/progress/update")
        .bearer(Some(token))
        .json(serde_json::to_value(data)?))
}

pub fn progress_stats(token: &str) -> ApiRequest {
    ApiRequest::get("/progress/stats").bearer(Some(token))
}

pub fn subtitles(movie_id: &str, language: &str) -> ApiRequest {
    ApiRequest::get(format!("/subtitles/movie/{movie_id}")).query("language", language)
}

pub fn categories() -> ApiRequest {
    ApiRequest::get("/categories")
}

pub fn languages() -> ApiRequest {
    ApiRequest::get("/languages")
}

// ============================================================================
// Typed Calls
// ============================================================================

impl ApiClient {
    pub async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        self.execute_as(health_check()).await
    }

    pub async fn register(&self, data: &RegisterData) -> Result<AuthResponse, ApiError> {
        self.execute_as(register(data)?).await
    }

    pub async fn login(&self, data: &LoginData) -> Result<AuthResponse, ApiError> {
        self.execute_as(login(data)?).await
    }

    pub async fn current_user(&self, token: &str) -> Result<CurrentUser, ApiError> {
        self.execute_as(current_user(token)).await
    }

    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.execute(logout(token)).await.map(|_| ())
    }

    pub async fn get_movies(&self, params: &MovieParams) -> Result<MovieResponse, ApiError> {
        self.execute_as(movies(params)).await
    }

    pub async fn get_movie(&self, movie_id: &str, token: Option<&str>) -> Result<MovieDetail, ApiError> {
        self.execute_as(movie(movie_id, token)).await
    }

    pub async fn search_movies(&self, query: &str, limit: u32) -> Result<SearchResults, ApiError> {
        self.execute_as(search_movies(query, limit)).await
    }

    pub async fn get_featured_movies(&self) -> Result<FeaturedMovies, ApiError> {
        self.execute_as(featured_movies()).await
    }

    pub async fn get_user_progress(&self, user_id: &str) -> Result<UserProgressList, ApiError> {
        self.execute_as(user_progress(user_id)).await
    }

    pub async fn update_progress(
        &self,
        data: &ProgressUpdate,
        token: &str,
    ) -> Result<ProgressUpdateResponse, ApiError> {
        self.execute_as(update_progress(data, token)?).await
    }

    pub async fn get_progress_stats(&self, token: &str) -> Result<ProgressStats, ApiError> {
        self.execute_as(progress_stats(token)).await
    }

    pub async fn get_subtitles(&self, movie_id: &str, language: &str) -> Result<SubtitleList, ApiError> {
        self.execute_as(subtitles(movie_id, language)).await
    }

    pub async fn get_categories(&self) -> Result<CategoryList, ApiError> {
        self.execute_as(categories()).await
    }

    pub async fn get_languages(&self) -> Result<LanguageList, ApiError> {
        self.execute_as(languages()).await
    }
}
