//! # Connection Health
//!
//! Answers "can we reach the backend right now?" from two inputs: the OS
//! network signal and a periodic probe of the health endpoint.

pub mod monitor;
pub mod network;
pub mod state;

pub use monitor::{ConnectionMonitor, DEFAULT_POLL_INTERVAL, MonitorOptions, health_key};
pub use network::NetworkSignal;
pub use state::{BackendStatus, ConnectionState};
