//! Command-line front end: one subcommand per catalogue query or mutation,
//! plus `status` for the connection monitor.

use std::sync::Arc;

use clap::Subcommand;
use log::{info, warn};
use serde_json::Value;

use crate::api::endpoints::DEFAULT_SUBTITLE_LANGUAGE;
use crate::api::types::{
    AuthResponse, LoginData, Movie, MovieParams, MovieResponse, ProgressUpdate, RegisterData,
    SearchResults,
};
use crate::api::{ApiClient, ApiError};
use crate::config::ResolvedConfig;
use crate::health::{BackendStatus, ConnectionMonitor, NetworkSignal};
use crate::queries::{self, QuerySpec};
use crate::query::{QueryCache, QuerySnapshot, SystemClock};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check network and backend connectivity
    Status {
        /// Keep polling and print every change until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// List movies
    Movies {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
        #[arg(long)]
        genre: Option<String>,
    },
    /// Show one movie (with your progress when a token is set)
    Movie { id: String },
    /// Search movie titles
    Search { query: String },
    /// List featured movies
    Featured,
    /// List movie categories
    Categories,
    /// List supported languages
    Languages,
    /// List subtitle tracks of a movie
    Subtitles {
        movie_id: String,
        #[arg(long, default_value = DEFAULT_SUBTITLE_LANGUAGE)]
        language: String,
    },
    /// Show watch progress for the configured user
    Progress,
    /// Show learning statistics (requires a token)
    Stats,
    /// Sign in and print the access token
    Login {
        email: String,
        #[arg(long, env = "CINEFLUENT_PASSWORD")]
        password: String,
    },
    /// Create an account
    Register {
        email: String,
        #[arg(long, env = "CINEFLUENT_PASSWORD")]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Sign out the current token
    Logout,
    /// Record watch progress on a movie (requires a token)
    UpdateProgress {
        movie_id: String,
        /// Percent of the movie watched, 0-100
        percentage: f32,
        /// Seconds watched
        time_watched: u32,
        #[arg(long)]
        vocabulary_learned: Option<u32>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("this command needs an access token (--token, CINEFLUENT_TOKEN or `cinefluent login`)")]
    MissingToken,
    #[error("this command needs a user id (--user-id or CINEFLUENT_USER_ID)")]
    MissingUser,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("no data returned for {0}")]
    NoData(String),
}

/// Composition root for one CLI invocation.
pub struct App {
    config: ResolvedConfig,
    api: ApiClient,
    cache: QueryCache,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        let api = ApiClient::new(config.base_url.clone());
        let cache = QueryCache::new(config.cache_capacity, Arc::new(SystemClock));
        Self { config, api, cache }
    }

    pub async fn run(&self, command: Command) -> Result<(), CliError> {
        info!("API base: {}", self.api.base_url());
        match command {
            Command::Status { watch } => self.status(watch).await,
            Command::Movies {
                page,
                limit,
                language,
                difficulty,
                genre,
            } => {
                let params = MovieParams {
                    page,
                    limit,
                    language,
                    difficulty,
                    genre,
                };
                let data = self.read(queries::movies(&self.api, &params)).await?;
                let page: MovieResponse = decode(&data)?;
                for movie in &page.movies {
                    println!("{}", format_movie(movie));
                }
                println!(
                    "page {} · {} of {} movies",
                    page.page,
                    page.movies.len(),
                    page.total
                );
                Ok(())
            }
            Command::Movie { id } => {
                let token = self.config.access_token.as_deref();
                self.print(queries::movie(&self.api, &id, token)).await
            }
            Command::Search { query } => {
                let spec = queries::search_movies(&self.api, &query);
                if !spec.options.enabled {
                    return Err(CliError::InvalidArgument(format!(
                        "search needs at least {} characters",
                        queries::MIN_SEARCH_LENGTH
                    )));
                }
                let data = self.read(spec).await?;
                let results: SearchResults = decode(&data)?;
                for movie in &results.movies {
                    println!("{}", format_movie(movie));
                }
                println!("{} matches for \"{}\"", results.total, results.query);
                Ok(())
            }
            Command::Featured => self.print(queries::featured_movies(&self.api)).await,
            Command::Categories => self.print(queries::categories(&self.api)).await,
            Command::Languages => self.print(queries::languages(&self.api)).await,
            Command::Subtitles { movie_id, language } => {
                self.print(queries::subtitles(&self.api, &movie_id, &language))
                    .await
            }
            Command::Progress => {
                let user_id = self.user_id()?;
                self.print(queries::user_progress(&self.api, user_id)).await
            }
            Command::Stats => {
                let token = self.token()?;
                let user_id = self.config.user_id.as_deref().unwrap_or("me");
                self.print(queries::progress_stats(&self.api, user_id, Some(token)))
                    .await
            }
            Command::Login { email, password } => {
                let response = queries::login(&self.cache, &self.api)
                    .mutate(LoginData { email, password })
                    .await?;
                print_auth(&response)
            }
            Command::Register {
                email,
                password,
                full_name,
            } => {
                let response = queries::register(&self.cache, &self.api)
                    .mutate(RegisterData {
                        email,
                        password,
                        full_name,
                    })
                    .await?;
                print_auth(&response)
            }
            Command::Logout => {
                self.api.logout(self.token()?).await?;
                println!("Signed out.");
                Ok(())
            }
            Command::UpdateProgress {
                movie_id,
                percentage,
                time_watched,
                vocabulary_learned,
            } => {
                if !(0.0..=100.0).contains(&percentage) {
                    return Err(CliError::InvalidArgument(format!(
                        "percentage must be between 0 and 100, got {percentage}"
                    )));
                }
                let token = self.token()?;
                let user_id = self.config.user_id.as_deref().unwrap_or("me");
                let response = queries::update_progress(&self.cache, &self.api, user_id, token)
                    .mutate(ProgressUpdate {
                        movie_id,
                        progress_percentage: percentage,
                        time_watched,
                        vocabulary_learned,
                    })
                    .await?;
                print_json(&response);
                Ok(())
            }
        }
    }

    async fn status(&self, watch: bool) -> Result<(), CliError> {
        // A terminal has no OS online/offline feed; the probe alone decides.
        let network = NetworkSignal::new(true);
        let probe = queries::health(&self.api, &self.config.monitor);
        let monitor =
            ConnectionMonitor::start(&self.cache, probe.fetcher, network.subscribe(), self.config.monitor)?;
        let mut updates = monitor.subscribe();

        if !watch {
            let state = *updates
                .wait_for(|s| s.backend_status != BackendStatus::Checking)
                .await
                .map_err(|_| CliError::NoData("health".to_string()))?;
            println!("{}", state);
            println!("connected: {}", state.is_connected());
            return Ok(());
        }

        println!("{}", monitor.state());
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *updates.borrow_and_update();
                    println!("{}", state);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        monitor.shutdown();
        Ok(())
    }

    async fn read(&self, spec: QuerySpec) -> Result<Arc<Value>, CliError> {
        let snapshot = spec.fetch(&self.cache).await?;
        into_data(snapshot)
    }

    async fn print(&self, spec: QuerySpec) -> Result<(), CliError> {
        let data = self.read(spec).await?;
        print_json(&data);
        Ok(())
    }

    fn token(&self) -> Result<&str, CliError> {
        self.config.access_token.as_deref().ok_or(CliError::MissingToken)
    }

    fn user_id(&self) -> Result<&str, CliError> {
        self.config.user_id.as_deref().ok_or(CliError::MissingUser)
    }
}

/// Turns a settled snapshot into its data, or the error that ended the fetch.
pub fn into_data(snapshot: QuerySnapshot) -> Result<Arc<Value>, CliError> {
    if snapshot.is_error() {
        if let Some(err) = snapshot.error {
            return Err(err.into());
        }
    }
    snapshot
        .data
        .ok_or_else(|| CliError::NoData(snapshot.key.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T, CliError> {
    Ok(T::deserialize(data).map_err(ApiError::from)?)
}

pub fn format_movie(movie: &Movie) -> String {
    let year = movie
        .release_year
        .map(|y| format!(" ({y})"))
        .unwrap_or_default();
    let mut line = format!("{}{}", movie.title, year);
    if !movie.difficulty_level.is_empty() {
        line.push_str(&format!(" [{}]", movie.difficulty_level));
    }
    if !movie.languages.is_empty() {
        line.push_str(&format!(" {}", movie.languages.join("/")));
    }
    if movie.is_premium {
        line.push_str(" ★");
    }
    format!("{:<10} {}", movie.id, line)
}

fn print_auth(response: &Value) -> Result<(), CliError> {
    let auth: AuthResponse = decode(response)?;
    if !auth.message.is_empty() {
        println!("{}", auth.message);
    }
    println!("Signed in as {} ({})", auth.user.email, auth.user.id);
    println!("export CINEFLUENT_TOKEN={}", auth.access_token);
    println!("export CINEFLUENT_USER_ID={}", auth.user.id);
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => warn!("Failed to render response: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CacheEntry, CacheKey};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn movie() -> Movie {
        serde_json::from_value(json!({
            "id": "m1",
            "title": "Amélie",
            "release_year": 2001,
            "difficulty_level": "intermediate",
            "languages": ["fr", "en"],
            "is_premium": true,
        }))
        .unwrap()
    }

    #[test]
    fn test_format_movie() {
        assert_eq!(
            format_movie(&movie()),
            "m1         Amélie (2001) [intermediate] fr/en ★"
        );
    }

    #[test]
    fn test_format_movie_minimal() {
        let bare: Movie = serde_json::from_value(json!({"id": "m2", "title": "Up"})).unwrap();
        assert_eq!(format_movie(&bare), "m2         Up");
    }

    #[test]
    fn test_into_data_prefers_error_after_failure() {
        let now = Instant::now();
        let ok = CacheEntry::pending(CacheKey::new("movies"))
            .resolved(Arc::new(json!([1])), now, Duration::ZERO, true);
        assert_eq!(into_data(QuerySnapshot::of(&ok, now)).unwrap().as_ref(), &json!([1]));

        let failed = ok.failed(ApiError::http(500, "boom"));
        let err = into_data(QuerySnapshot::of(&failed, now)).unwrap_err();
        assert!(matches!(err, CliError::Api(ApiError::Http { status: 500, .. })));
    }

    #[test]
    fn test_into_data_without_data() {
        let err = into_data(QuerySnapshot::empty(CacheKey::new("languages"))).unwrap_err();
        assert_eq!(err.to_string(), r#"no data returned for ["languages"]"#);
    }
}
