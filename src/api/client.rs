//! # Request Executor
//!
//! Issues one HTTP call against the CineFluent REST API and normalizes every
//! way it can go wrong into [`ApiError`]. No retries happen here: retry policy
//! belongs to the query cache.

use log::{debug, warn};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;

/// Fields a FastAPI-style error body may carry a human-readable message in.
const ERROR_MESSAGE_FIELDS: [&str; 3] = ["detail", "message", "error"];

/// A single request, described independently of the client that sends it.
///
/// Endpoint builders in [`super::endpoints`] return these so the same request
/// can be sent directly or wrapped in a cached query fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Appends the pair only when `value` is present.
    pub fn query_opt(self, name: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attaches `Authorization: Bearer <token>`. Empty tokens are ignored.
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// HTTP client bound to a fixed API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `request` and returns the decoded JSON body.
    ///
    /// An empty 2xx body decodes as `Value::Null` (e.g. logout).
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let http_request = builder.build().map_err(|e| {
            let err = ApiError::validation(format!("invalid request: {e}"));
            warn!("API request failed: {} - {}", url, err);
            err
        })?;
        let full_url = http_request.url().to_string();
        debug!("{} {}", request.method, full_url);

        let result = self.send(http_request, &full_url).await;
        if let Err(ref err) = result {
            warn!("API request failed: {} - {}", full_url, err);
        }
        result
    }

    /// Sends `request` and deserializes the body into `T`.
    /// A shape mismatch is reported as [`ApiError::Parse`].
    pub async fn execute_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(|e| {
            let err = ApiError::parse(format!("unexpected response shape from {path}: {e}"));
            warn!("API request failed: {}{} - {}", self.base_url, path, err);
            err
        })
    }

    async fn send(&self, request: reqwest::Request, url: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ApiError::network(url, e.to_string()))?;

        let status = response.status();
        debug!("API response status: {} for {}", status, url);

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(url, e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::http(
                status.as_u16(),
                error_message(status.as_u16(), &body),
            ));
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| ApiError::parse(e.to_string()))
    }
}

/// Picks the human-readable message out of an error body, falling back to a
/// generic status-coded one.
fn error_message(status: u16, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            ERROR_MESSAGE_FIELDS
                .iter()
                .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP error! status: {status}"))
}
