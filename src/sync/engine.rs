// Composition root of the sync core.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use super::connectivity::ConnectivityCell;
use super::model::{Connectivity, PanelConfig, ServiceState};
use super::poller::{PollOutcome, StatusPoller};
use super::scheduler::Scheduler;
use super::store::ServiceStateStore;
use super::toggle::ToggleController;
use crate::error::{Result, SyncError};
use crate::source::{ConfigSource, StatusSource, ToggleRequester};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Everything that only exists between `initialize` and `shutdown`.
struct Session {
    config: PanelConfig,
    store: Arc<ServiceStateStore>,
    poller: Arc<StatusPoller>,
    controller: Arc<ToggleController>,
    scheduler: Arc<Scheduler>,
}

/// Owns the store, the poller and the toggle controller for one session and
/// exposes the notification streams the view subscribes to.
///
/// The channels are created up front so a view can subscribe before
/// `initialize` and still observe a configuration failure.
pub struct SyncEngine {
    status_source: Arc<dyn StatusSource>,
    toggle_requester: Arc<dyn ToggleRequester>,
    changes: broadcast::Sender<ServiceState>,
    connectivity: ConnectivityCell,
    session: Option<Session>,
}

impl SyncEngine {
    pub fn new(
        status_source: Arc<dyn StatusSource>,
        toggle_requester: Arc<dyn ToggleRequester>,
    ) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            status_source,
            toggle_requester,
            changes,
            connectivity: ConnectivityCell::new(),
            session: None,
        }
    }

    /// Loads the configuration, builds the store and starts polling.
    ///
    /// On failure connectivity turns to `error` and nothing is polled.
    /// Re-initializing shuts the previous session down first.
    pub async fn initialize(&mut self, config_source: &dyn ConfigSource) -> Result<()> {
        self.shutdown();

        let config = match config_source.fetch_config().await {
            Ok(config) => config,
            Err(source) => return Err(self.fail_init(SyncError::ConfigUnavailable(source))),
        };
        let store = match ServiceStateStore::initialize(&config.services, self.changes.clone()) {
            Ok(store) => Arc::new(store),
            Err(err) => return Err(self.fail_init(err)),
        };

        let scheduler = Arc::new(Scheduler::default());
        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&self.status_source),
            Arc::clone(&store),
            self.connectivity.clone(),
        ));
        let controller = Arc::new(ToggleController::new(
            Arc::clone(&store),
            Arc::clone(&self.toggle_requester),
            Arc::clone(&poller),
            self.connectivity.clone(),
            Arc::clone(&scheduler),
        ));

        self.connectivity.set(Connectivity::Online);
        let interval = poller.start(config.poll_interval_seconds);
        info!(
            services = store.len(),
            interval_secs = interval.as_secs(),
            "sync engine initialized"
        );

        self.session = Some(Session {
            config,
            store,
            poller,
            controller,
            scheduler,
        });
        Ok(())
    }

    fn fail_init(&self, err: SyncError) -> SyncError {
        error!(error = %err, "failed to initialize sync engine");
        self.connectivity
            .set(Connectivity::Error(Connectivity::INIT_ERROR.to_string()));
        err
    }

    /// Stops polling and cancels every pending delayed task. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            // Rollbacks of aborted toggles land after this; keep them off the
            // change channel the next session shares.
            session.store.detach();
            session.poller.stop();
            session.scheduler.cancel_all();
            info!("sync engine shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Fire-and-forget toggle.
    ///
    /// The in-flight check and the optimistic write happen before this returns;
    /// the command itself runs on a background task and reports failures on
    /// the connectivity stream. Only an unknown service (or a missing session)
    /// is returned as an error.
    pub fn toggle(&self, name: &str) -> Result<()> {
        let session = self.session()?;
        if let Some(pending) = session.controller.begin(name)? {
            let controller = Arc::clone(&session.controller);
            session.scheduler.spawn(async move {
                controller.finish(pending).await;
            });
        }
        Ok(())
    }

    /// Polls immediately, outside the regular schedule.
    pub async fn refresh(&self) -> Result<PollOutcome> {
        let poller = Arc::clone(&self.session()?.poller);
        Ok(poller.poll_once().await)
    }

    /// Schedules an immediate poll on a background task and returns at once.
    /// Results arrive on the change and connectivity streams.
    pub fn request_refresh(&self) -> Result<()> {
        let session = self.session()?;
        let poller = Arc::clone(&session.poller);
        session.scheduler.spawn(async move {
            poller.poll_once().await;
        });
        Ok(())
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ServiceState> {
        self.changes.subscribe()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.get()
    }

    /// Current state of every service in configuration order. Empty before
    /// initialization.
    pub fn snapshot(&self) -> Vec<ServiceState> {
        self.session
            .as_ref()
            .map(|session| session.store.snapshot())
            .unwrap_or_default()
    }

    pub fn service(&self, name: &str) -> Result<ServiceState> {
        self.session()?.store.get(name)
    }

    pub fn config(&self) -> Option<&PanelConfig> {
        self.session.as_ref().map(|session| &session.config)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(SyncError::NotInitialized)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
