// Periodic refresh of every service from the status source.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::connectivity::ConnectivityCell;
use super::model::{Connectivity, Lifecycle, poll_interval_from};
use super::store::ServiceStateStore;
use crate::error::SyncError;
use crate::source::StatusSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of reports that matched a tracked service.
    Applied(usize),
    Failed,
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    store: Arc<ServiceStateStore>,
    connectivity: ConnectivityCell,
    schedule: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        store: Arc<ServiceStateStore>,
        connectivity: ConnectivityCell,
    ) -> Self {
        Self {
            source,
            store,
            connectivity,
            schedule: Mutex::new(None),
        }
    }

    /// Polls now, then every `interval_seconds` (5 when unset or non-positive).
    /// Restarts the schedule when already running. Returns the effective interval.
    pub fn start(self: &Arc<Self>, interval_seconds: Option<i64>) -> Duration {
        let interval = poll_interval_from(interval_seconds);
        self.start_every(interval);
        interval
    }

    pub fn start_every(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(run_schedule(weak, interval));
        if let Some(previous) = self.lock_schedule().replace(handle) {
            debug!("restarting poll schedule");
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "status polling started");
    }

    /// Cancels the recurring schedule. A poll request already sent still lands.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_schedule().take() {
            handle.abort();
            info!("status polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_schedule()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetches all statuses once and writes them into the store.
    ///
    /// Results are applied even to services with a toggle in flight, so a late
    /// poll can briefly overwrite an optimistic write.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.source.fetch_statuses().await {
            Ok(reports) => {
                let mut applied = 0;
                for report in &reports {
                    let lifecycle = Lifecycle::classify(&report.state);
                    if self.store.apply_poll(&report.name, lifecycle, &report.status) {
                        applied += 1;
                    }
                }
                self.connectivity.set(Connectivity::Online);
                debug!(applied, received = reports.len(), "status poll applied");
                PollOutcome::Applied(applied)
            }
            Err(source) => {
                let err = SyncError::PollFailure(source);
                warn!(error = %err, "status poll failed");
                self.connectivity.set(Connectivity::Offline);
                PollOutcome::Failed
            }
        }
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.schedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule(poller: Weak<StatusPoller>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // First tick completes immediately.
        ticker.tick().await;
        let Some(poller) = poller.upgrade() else {
            return;
        };
        // Each poll runs detached so that stop() never cancels a request in flight.
        tokio::spawn(async move {
            poller.poll_once().await;
        });
    }
}
