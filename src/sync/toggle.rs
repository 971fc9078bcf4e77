// User-initiated start/stop of a single service with optimistic update and rollback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::connectivity::ConnectivityCell;
use super::model::{Connectivity, Lifecycle, ToggleAction, ToggleRequest};
use super::poller::StatusPoller;
use super::scheduler::Scheduler;
use super::store::ServiceStateStore;
use crate::error::{Result, SyncError};
use crate::source::ToggleRequester;

/// Delay before the poll that confirms a successful toggle.
pub const CONFIRM_POLL_DELAY: Duration = Duration::from_millis(2000);

/// How long a toggle failure stays on the connectivity signal.
pub const ERROR_RESET_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Another toggle for the service was still in flight; nothing was sent.
    Coalesced,
    /// The backend accepted the command; the optimistic lifecycle stands.
    Confirmed(Lifecycle),
    /// The command failed; the service went back to this lifecycle.
    RolledBack(Lifecycle),
}

/// A claimed in-flight slot.
///
/// Dropping it without resolving (a cancelled task, a panic further up) rolls
/// the service back and frees the slot, so the flag never outlives the toggle.
#[derive(Debug)]
pub struct PendingToggle {
    store: Arc<ServiceStateStore>,
    name: String,
    previous: Lifecycle,
    optimistic: Lifecycle,
    armed: bool,
}

impl PendingToggle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn previous(&self) -> Lifecycle {
        self.previous
    }

    pub fn optimistic(&self) -> Lifecycle {
        self.optimistic
    }

    pub fn action(&self) -> ToggleAction {
        if self.previous.is_running() {
            ToggleAction::Down
        } else {
            ToggleAction::Up
        }
    }

    fn resolve(mut self, resulting: Lifecycle) {
        self.armed = false;
        self.store.end_toggle(&self.name, resulting);
    }
}

impl Drop for PendingToggle {
    fn drop(&mut self) {
        if self.armed {
            warn!(service = %self.name, "toggle abandoned before resolving, rolling back");
            self.store.end_toggle(&self.name, self.previous);
        }
    }
}

pub struct ToggleController {
    store: Arc<ServiceStateStore>,
    requester: Arc<dyn ToggleRequester>,
    poller: Arc<StatusPoller>,
    connectivity: ConnectivityCell,
    scheduler: Arc<Scheduler>,
}

impl ToggleController {
    pub fn new(
        store: Arc<ServiceStateStore>,
        requester: Arc<dyn ToggleRequester>,
        poller: Arc<StatusPoller>,
        connectivity: ConnectivityCell,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            store,
            requester,
            poller,
            connectivity,
            scheduler,
        }
    }

    /// Claims the slot and applies the optimistic lifecycle.
    ///
    /// Returns `Ok(None)` when a toggle for `name` is already in flight.
    pub fn begin(&self, name: &str) -> Result<Option<PendingToggle>> {
        let current = self.store.get(name)?;
        if !self.store.begin_toggle(name) {
            debug!(service = %name, "toggle already in flight, ignoring");
            return Ok(None);
        }

        let previous = self
            .store
            .get(name)
            .map_or(current.lifecycle, |state| state.lifecycle);
        let optimistic = previous.toggled();
        self.store.commit_optimistic(name, optimistic);

        Ok(Some(PendingToggle {
            store: Arc::clone(&self.store),
            name: name.to_string(),
            previous,
            optimistic,
            armed: true,
        }))
    }

    /// Sends the command for a claimed toggle and settles the store.
    pub async fn finish(&self, pending: PendingToggle) -> ToggleOutcome {
        let action = pending.action();
        let request = ToggleRequest::new(action, pending.name());
        info!(service = %pending.name(), action = action.as_str(), "sending toggle");

        match self.requester.request_toggle(&request).await {
            Ok(()) => {
                self.schedule_confirmation();
                let optimistic = pending.optimistic();
                pending.resolve(optimistic);
                ToggleOutcome::Confirmed(optimistic)
            }
            Err(source) => {
                let err = SyncError::ToggleFailure {
                    service: pending.name().to_string(),
                    source,
                };
                warn!(error = %err, "toggle failed, rolling back");
                let previous = pending.previous();
                pending.resolve(previous);
                self.connectivity.set(Connectivity::toggle_error());
                self.schedule_connectivity_reset();
                ToggleOutcome::RolledBack(previous)
            }
        }
    }

    /// Both phases in one call.
    pub async fn toggle(&self, name: &str) -> Result<ToggleOutcome> {
        match self.begin(name)? {
            Some(pending) => Ok(self.finish(pending).await),
            None => Ok(ToggleOutcome::Coalesced),
        }
    }

    fn schedule_confirmation(&self) {
        let poller = Arc::clone(&self.poller);
        self.scheduler
            .spawn_after("confirm_poll", CONFIRM_POLL_DELAY, async move {
                poller.poll_once().await;
            });
    }

    fn schedule_connectivity_reset(&self) {
        let connectivity = self.connectivity.clone();
        self.scheduler
            .spawn_after("connectivity_reset", ERROR_RESET_DELAY, async move {
                connectivity.set(Connectivity::Online);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::StatusSource;
    use crate::sync::model::{ServiceDescriptor, ServiceStatusReport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, broadcast};

    struct RecordingRequester {
        requests: Mutex<Vec<ToggleRequest>>,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingRequester {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail,
                gate: None,
            })
        }

        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail: false,
                gate: Some(gate),
            })
        }

        fn requests(&self) -> Vec<ToggleRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToggleRequester for RecordingRequester {
        async fn request_toggle(
            &self,
            request: &ToggleRequest,
        ) -> std::result::Result<(), SourceError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                Err(SourceError::Status {
                    status: 502,
                    message: "Service toggle failed with status 502".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct CountingStatus {
        calls: AtomicUsize,
        reports: Vec<ServiceStatusReport>,
    }

    #[async_trait]
    impl StatusSource for CountingStatus {
        async fn fetch_statuses(
            &self,
        ) -> std::result::Result<Vec<ServiceStatusReport>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reports.clone())
        }
    }

    struct Fixture {
        store: Arc<ServiceStateStore>,
        status: Arc<CountingStatus>,
        connectivity: ConnectivityCell,
        scheduler: Arc<Scheduler>,
        controller: ToggleController,
    }

    fn fixture(requester: Arc<RecordingRequester>, initial: Lifecycle) -> Fixture {
        let (tx, _rx) = broadcast::channel(64);
        let store = Arc::new(
            ServiceStateStore::initialize(
                &[ServiceDescriptor {
                    name: "web".into(),
                    display_name: "Web".into(),
                }],
                tx,
            )
            .unwrap(),
        );
        store.apply_poll("web", initial, "seed");

        let status = Arc::new(CountingStatus {
            calls: AtomicUsize::new(0),
            reports: Vec::new(),
        });
        let connectivity = ConnectivityCell::new();
        let scheduler = Arc::new(Scheduler::default());
        let poller = Arc::new(StatusPoller::new(
            status.clone(),
            Arc::clone(&store),
            connectivity.clone(),
        ));
        let controller = ToggleController::new(
            Arc::clone(&store),
            requester,
            poller,
            connectivity.clone(),
            Arc::clone(&scheduler),
        );
        Fixture {
            store,
            status,
            connectivity,
            scheduler,
            controller,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_service_is_started_optimistically() {
        let requester = RecordingRequester::new(false);
        let fx = fixture(Arc::clone(&requester), Lifecycle::Stopped);

        let pending = fx.controller.begin("web").unwrap().unwrap();
        let web = fx.store.get("web").unwrap();
        assert_eq!(web.lifecycle, Lifecycle::Running);
        assert!(web.toggle_in_flight);
        assert!(requester.requests().is_empty());

        let outcome = fx.controller.finish(pending).await;
        assert_eq!(outcome, ToggleOutcome::Confirmed(Lifecycle::Running));
        assert_eq!(
            requester.requests(),
            vec![ToggleRequest::new(ToggleAction::Up, "web")]
        );
        let web = fx.store.get("web").unwrap();
        assert_eq!(web.lifecycle, Lifecycle::Running);
        assert!(!web.toggle_in_flight);
        assert_eq!(web.pending_lifecycle, None);
    }

    #[tokio::test(start_paused = true)]
    async fn success_schedules_one_confirmatory_poll() {
        let fx = fixture(RecordingRequester::new(false), Lifecycle::Running);

        fx.controller.toggle("web").await.unwrap();
        assert_eq!(fx.status.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1990)).await;
        assert_eq!(fx.status.calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fx.status.calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fx.status.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_rolls_back_running_service() {
        let requester = RecordingRequester::new(true);
        let fx = fixture(Arc::clone(&requester), Lifecycle::Running);

        let outcome = fx.controller.toggle("web").await.unwrap();
        assert_eq!(outcome, ToggleOutcome::RolledBack(Lifecycle::Running));
        assert_eq!(
            requester.requests(),
            vec![ToggleRequest::new(ToggleAction::Down, "web")]
        );
        let web = fx.store.get("web").unwrap();
        assert_eq!(web.lifecycle, Lifecycle::Running);
        assert!(!web.toggle_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_rolls_back_stopped_service() {
        let fx = fixture(RecordingRequester::new(true), Lifecycle::Stopped);
        fx.controller.toggle("web").await.unwrap();
        let web = fx.store.get("web").unwrap();
        assert_eq!(web.lifecycle, Lifecycle::Stopped);
        assert!(!web.toggle_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_shows_toggle_error_for_three_seconds() {
        let fx = fixture(RecordingRequester::new(true), Lifecycle::Stopped);
        fx.controller.toggle("web").await.unwrap();
        assert_eq!(fx.connectivity.get(), Connectivity::toggle_error());
        assert_eq!(fx.status.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2990)).await;
        assert_eq!(fx.connectivity.get(), Connectivity::toggle_error());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fx.connectivity.get(), Connectivity::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn error_reset_ignores_intervening_offline() {
        let fx = fixture(RecordingRequester::new(true), Lifecycle::Stopped);
        fx.controller.toggle("web").await.unwrap();
        fx.connectivity.set(Connectivity::Offline);

        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fx.connectivity.get(), Connectivity::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn second_toggle_while_in_flight_is_coalesced() {
        let gate = Arc::new(Notify::new());
        let requester = RecordingRequester::gated(Arc::clone(&gate));
        let fx = fixture(Arc::clone(&requester), Lifecycle::Stopped);

        let pending = fx.controller.begin("web").unwrap().unwrap();
        assert!(fx.controller.begin("web").unwrap().is_none());
        assert_eq!(
            fx.controller.toggle("web").await.unwrap(),
            ToggleOutcome::Coalesced
        );

        gate.notify_one();
        fx.controller.finish(pending).await;
        assert_eq!(requester.requests().len(), 1);
        assert!(!fx.store.get("web").unwrap().toggle_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_service_is_rejected_without_side_effects() {
        let requester = RecordingRequester::new(false);
        let fx = fixture(Arc::clone(&requester), Lifecycle::Stopped);
        let before = fx.store.snapshot();

        let err = fx.controller.toggle("nonexistent").await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownService(name) if name == "nonexistent"));
        assert!(requester.requests().is_empty());
        assert_eq!(fx.store.snapshot(), before);
        assert_eq!(fx.scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_pending_toggle_rolls_back() {
        let fx = fixture(RecordingRequester::new(false), Lifecycle::Running);
        let pending = fx.controller.begin("web").unwrap().unwrap();
        assert_eq!(fx.store.get("web").unwrap().lifecycle, Lifecycle::Stopped);

        drop(pending);
        let web = fx.store.get("web").unwrap();
        assert_eq!(web.lifecycle, Lifecycle::Running);
        assert!(!web.toggle_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_toggle_task_releases_the_slot() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(RecordingRequester::gated(gate), Lifecycle::Stopped);
        let controller = Arc::new(fx.controller);

        let pending = controller.begin("web").unwrap().unwrap();
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.finish(pending).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fx.store.get("web").unwrap().toggle_in_flight);

        task.abort();
        let _ = task.await;
        let web = fx.store.get("web").unwrap();
        assert!(!web.toggle_in_flight);
        assert_eq!(web.lifecycle, Lifecycle::Stopped);
    }
}
