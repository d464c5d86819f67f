use thiserror::Error;

/// Every failure the data-access layer can surface.
///
/// Variants carry enough info to decide retryability: see [`ApiError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never reached the server (DNS, refused connection, reset).
    #[error("network error ({url}): {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not the JSON we expected.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Caller misuse: malformed key or options. Never retried.
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl ApiError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Network failures and 5xx responses may succeed on a later attempt.
    /// 4xx, parse and validation errors are terminal on first occurrence.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Parse { .. } | ApiError::Validation { .. } => false,
        }
    }

    /// HTTP status, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::parse(e.to_string())
    }
}
