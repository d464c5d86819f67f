//! CineFluent client data-access core
//!
//! ```text
//!   cli ──► queries ──► query (cache) ──► api (executor) ──► backend
//!             │              ▲
//!             └─► mutation ──┘ invalidate
//!   health ──► query ["health"] + NetworkSignal ──► ConnectionState
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod health;
pub mod mutation;
pub mod queries;
pub mod query;

#[cfg(test)]
pub mod test_support;
