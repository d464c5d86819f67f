//! # CineFluent REST API
//!
//! - [`client`]: `ApiClient::execute`, the single-call request executor
//! - [`endpoints`]: request builders and typed calls per endpoint
//! - [`error`]: `ApiError`, the one error shape every failure is folded into
//! - [`types`]: wire types

pub mod client;
pub mod endpoints;
pub mod error;
pub mod types;

pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;

/// Production API base; overridable through config or `CINEFLUENT_API_BASE`.
pub const DEFAULT_API_BASE: &str = "https://cinefluent-api-production.up.railway.app/api/v1";
