use std::fmt;

use crate::query::{EntryStatus, QuerySnapshot};

/// What the latest completed health probe said about the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendStatus {
    /// No probe has completed yet.
    #[default]
    Checking,
    Connected,
    Disconnected,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::Checking => write!(f, "checking"),
            BackendStatus::Connected => write!(f, "connected"),
            BackendStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

impl BackendStatus {
    /// Maps a probe snapshot to a status. `None` while a probe is in progress
    /// or none has started: the previous status stands until a result lands.
    pub fn from_probe(snapshot: &QuerySnapshot) -> Option<Self> {
        match snapshot.status? {
            EntryStatus::Error => Some(BackendStatus::Disconnected),
            EntryStatus::Fresh | EntryStatus::Stale if snapshot.data.is_some() => {
                Some(BackendStatus::Connected)
            }
            _ => None,
        }
    }
}

/// Combined connectivity. Always rebuilt from both inputs, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub network_online: bool,
    pub backend_status: BackendStatus,
}

impl ConnectionState {
    pub const fn new(network_online: bool, backend_status: BackendStatus) -> Self {
        Self {
            network_online,
            backend_status,
        }
    }

    pub const fn is_connected(&self) -> bool {
        self.network_online && matches!(self.backend_status, BackendStatus::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "network {}, backend {}",
            if self.network_online { "online" } else { "offline" },
            self.backend_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::query::{CacheEntry, CacheKey};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_is_connected_truth_table() {
        use BackendStatus::*;
        assert!(ConnectionState::new(true, Connected).is_connected());
        assert!(!ConnectionState::new(false, Connected).is_connected());
        assert!(!ConnectionState::new(true, Checking).is_connected());
        assert!(!ConnectionState::new(true, Disconnected).is_connected());
        assert!(!ConnectionState::new(false, Disconnected).is_connected());
    }

    #[test]
    fn test_from_probe() {
        let now = Instant::now();
        let key = CacheKey::new("health");
        let pending = CacheEntry::pending(key.clone());
        let ok = pending.resolved(Arc::new(json!({"status": "healthy"})), now, Duration::ZERO, true);

        assert_eq!(BackendStatus::from_probe(&QuerySnapshot::empty(key)), None);
        assert_eq!(BackendStatus::from_probe(&QuerySnapshot::of(&pending, now)), None);
        assert_eq!(
            BackendStatus::from_probe(&QuerySnapshot::of(&ok, now)),
            Some(BackendStatus::Connected)
        );
        assert_eq!(BackendStatus::from_probe(&QuerySnapshot::of(&ok.fetching(), now)), None);
        assert_eq!(
            BackendStatus::from_probe(&QuerySnapshot::of(&ok.failed(ApiError::network("u", "down")), now)),
            Some(BackendStatus::Disconnected)
        );
    }

    #[test]
    fn test_display() {
        let state = ConnectionState::new(false, BackendStatus::Checking);
        assert_eq!(state.to_string(), "network offline, backend checking");
    }
}
