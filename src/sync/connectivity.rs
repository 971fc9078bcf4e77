// Process-wide connectivity signal shared by the poller and the toggle controller.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::model::Connectivity;

/// Shared handle on the process-wide connectivity signal.
#[derive(Debug, Clone)]
pub struct ConnectivityCell {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl Default for ConnectivityCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Connectivity::Online);
        Self { tx: Arc::new(tx) }
    }

    /// Stores the new value; subscribers are only woken when it changes.
    pub fn set(&self, next: Connectivity) {
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, "connectivity changed");
            *current = next;
            true
        });
    }

    pub fn get(&self) -> Connectivity {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}
