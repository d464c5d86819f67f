use std::sync::Arc;

use log::info;
use tokio::sync::watch;

/// OS-level online/offline signal.
///
/// The platform layer owns a clone and calls [`NetworkSignal::set_online`]
/// from its online/offline notifications; the monitor only reads.
#[derive(Debug, Clone)]
pub struct NetworkSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkSignal {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!("network is now {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkSignal {
    fn default() -> Self {
        Self::new(true)
    }
}
