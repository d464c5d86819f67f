//! Wire types of the CineFluent REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Runtime in minutes.
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub release_year: Option<u16>,
    #[serde(default)]
    pub difficulty_level: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub thumbnail_url: String,
    pub video_url: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub vocabulary_count: u32,
    pub imdb_rating: Option<f32>,
}

/// One page of the movie listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieResponse {
    pub movies: Vec<Movie>,
    pub total: u32,
    pub page: u32,
    pub per_page: u32,
}

/// Filters for the paginated movie listing. `None` fields are omitted from the query string.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieDetail {
    pub movie: Movie,
    /// Present only when the request was authenticated.
    pub user_progress: Option<UserProgress>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub movies: Vec<Movie>,
    pub query: String,
    pub total: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeaturedMovies {
    pub movies: Vec<Movie>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProgress {
    pub user_id: String,
    pub movie_id: String,
    pub progress_percentage: f32,
    /// Seconds watched.
    pub time_watched: u32,
    #[serde(default)]
    pub vocabulary_learned: u32,
    pub last_watched_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProgressList {
    pub progress: Vec<UserProgress>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub movie_id: String,
    pub progress_percentage: f32,
    pub time_watched: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_learned: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgressUpdateResponse {
    pub message: String,
    pub progress: UserProgress,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgressStats {
    pub total_movies_watched: u32,
    pub completed_movies: u32,
    pub total_time_watched: u32,
    pub total_vocabulary_learned: u32,
    pub average_progress: f32,
    #[serde(default)]
    pub recent_activity: Vec<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// `/auth/me` returns loosely-typed user and profile records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub user: Value,
    #[serde(default)]
    pub profile: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subtitle {
    pub id: String,
    pub movie_id: String,
    pub language: String,
    pub title: String,
    pub file_type: String,
    pub total_cues: u32,
    pub total_segments: u32,
    pub duration: f64,
    pub vocabulary_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubtitleList {
    pub subtitles: Vec<Subtitle>,
    pub total: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryList {
    pub categories: Vec<Category>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LanguageList {
    pub languages: Vec<String>,
}
