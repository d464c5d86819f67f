use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiError;
use crate::query::{
    Callback, CacheKey, Fetcher, QueryCache, QueryHandle, QueryOptions, QuerySnapshot, RetryPolicy,
    Subscription,
};

use super::state::{BackendStatus, ConnectionState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Cache key of the health probe.
pub fn health_key() -> CacheKey {
    CacheKey::new("health")
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    /// Applied per probe: the backend is only reported down once every
    /// attempt of a probe has failed.
    pub retry: RetryPolicy,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorOptions {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::default()
            .poll_interval(self.poll_interval)
            .retry(self.retry)
    }
}

/// Latest value of each input. `ConnectionState` is derived from these on
/// every change.
#[derive(Debug)]
struct Inputs {
    network_online: bool,
    backend_status: BackendStatus,
}

#[derive(Debug)]
struct Publisher {
    inputs: Mutex<Inputs>,
    tx: watch::Sender<ConnectionState>,
}

impl Publisher {
    fn update(&self, apply: impl FnOnce(&mut Inputs)) {
        let next = {
            let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut inputs);
            ConnectionState::new(inputs.network_online, inputs.backend_status)
        };
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
        if changed {
            info!("connection state: {}", next);
        }
    }

    fn probe_result(&self, snapshot: &QuerySnapshot) {
        if let Some(status) = BackendStatus::from_probe(snapshot) {
            self.update(|inputs| inputs.backend_status = status);
        }
    }
}

/// Tracks backend reachability by polling the health endpoint through the
/// query cache, combined with the OS network signal.
///
/// ```text
/// health probe (poll) ──► ["health"] entry ──┐
///                                            ├──► ConnectionState ──► watch
/// NetworkSignal ─────────────────────────────┘
/// ```
///
/// Polling continues while the network is offline, so the backend status is
/// current as soon as the network returns.
pub struct ConnectionMonitor {
    probe: QueryHandle,
    state: watch::Receiver<ConnectionState>,
    _probe_updates: Subscription,
    network_task: JoinHandle<()>,
}

impl ConnectionMonitor {
    /// Starts polling. Must be called from within a tokio runtime.
    pub fn start(
        cache: &QueryCache,
        probe: Fetcher,
        network: watch::Receiver<bool>,
        options: MonitorOptions,
    ) -> Result<Self, ApiError> {
        let key = health_key();
        let (tx, state) = watch::channel(ConnectionState::new(*network.borrow(), BackendStatus::Checking));
        let publisher = Arc::new(Publisher {
            inputs: Mutex::new(Inputs {
                network_online: *network.borrow(),
                backend_status: BackendStatus::Checking,
            }),
            tx,
        });

        // Subscribe before the handle issues its first probe so no result is missed.
        let on_probe = publisher.clone();
        let callback: Callback = Arc::new(move |snapshot: &QuerySnapshot| on_probe.probe_result(snapshot));
        let probe_updates = cache.subscribe_with_current(&key, callback);
        let probe = cache.query(key, probe, options.query_options())?;

        let network_task = tokio::spawn(watch_network(network, publisher));
        debug!("connection monitor started, polling every {:?}", options.poll_interval);

        Ok(Self {
            probe,
            state,
            _probe_updates: probe_updates,
            network_task,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Probes immediately instead of waiting for the next poll.
    pub async fn probe_now(&self) -> ConnectionState {
        let _ = self.probe.refetch().await;
        self.state()
    }

    /// Stops polling and network tracking. Dropping the monitor does the same.
    pub fn shutdown(self) {}
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.network_task.abort();
        debug!("connection monitor stopped");
    }
}

async fn watch_network(mut network: watch::Receiver<bool>, publisher: Arc<Publisher>) {
    while network.changed().await.is_ok() {
        let online = *network.borrow_and_update();
        publisher.update(|inputs| inputs.network_online = online);
    }
}
