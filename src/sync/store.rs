// In-memory table of per-service state. The single source of truth for the view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::model::{Lifecycle, ServiceDescriptor, ServiceState};
use crate::error::{Result, SyncError};

#[derive(Debug, Default)]
struct Table {
    services: Vec<ServiceState>,
    index: HashMap<String, usize>,
}

impl Table {
    fn entry_mut(&mut self, name: &str) -> Option<&mut ServiceState> {
        let idx = *self.index.get(name)?;
        self.services.get_mut(idx)
    }
}

/// Every mutation runs inside one short critical section and publishes the
/// resulting snapshot on the change channel. The lock is never held across an
/// await point.
#[derive(Debug)]
pub struct ServiceStateStore {
    table: Mutex<Table>,
    changes: broadcast::Sender<ServiceState>,
    detached: AtomicBool,
}

impl ServiceStateStore {
    /// Builds one entry per descriptor. Fails on duplicate or empty names.
    pub fn initialize(
        descriptors: &[ServiceDescriptor],
        changes: broadcast::Sender<ServiceState>,
    ) -> Result<Self> {
        let mut table = Table::default();
        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(SyncError::Config("service with an empty name".to_string()));
            }
            if table.index.contains_key(&descriptor.name) {
                return Err(SyncError::Config(format!(
                    "duplicate service name: {}",
                    descriptor.name
                )));
            }
            table
                .index
                .insert(descriptor.name.clone(), table.services.len());
            table.services.push(ServiceState::new(descriptor));
        }

        Ok(Self {
            table: Mutex::new(table),
            changes,
            detached: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceState> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Result<ServiceState> {
        let table = self.lock();
        table
            .index
            .get(name)
            .and_then(|&idx| table.services.get(idx))
            .cloned()
            .ok_or_else(|| SyncError::UnknownService(name.to_string()))
    }

    /// All services in configuration order.
    pub fn snapshot(&self) -> Vec<ServiceState> {
        self.lock().services.clone()
    }

    /// Writes a poll result. Returns false when the service is not tracked.
    pub fn apply_poll(&self, name: &str, lifecycle: Lifecycle, status_text: &str) -> bool {
        self.mutate(name, "apply_poll", |state| {
            state.lifecycle = lifecycle;
            state.status_text = status_text.to_string();
        })
    }

    /// Claims the per-service toggle slot.
    ///
    /// Returns false without touching anything when a toggle is already in
    /// flight or the service is unknown.
    pub fn begin_toggle(&self, name: &str) -> bool {
        let snapshot = {
            let mut table = self.lock();
            let Some(state) = table.entry_mut(name) else {
                warn!(service = %name, "begin_toggle for untracked service");
                return false;
            };
            if state.toggle_in_flight {
                return false;
            }
            state.toggle_in_flight = true;
            state.clone()
        };
        self.publish(snapshot);
        true
    }

    /// Flips the visible lifecycle ahead of backend confirmation.
    pub fn commit_optimistic(&self, name: &str, optimistic: Lifecycle) -> bool {
        self.mutate(name, "commit_optimistic", |state| {
            state.lifecycle = optimistic;
            state.pending_lifecycle = Some(optimistic);
        })
    }

    /// Releases the toggle slot and settles the lifecycle.
    pub fn end_toggle(&self, name: &str, resulting: Lifecycle) -> bool {
        self.mutate(name, "end_toggle", |state| {
            state.toggle_in_flight = false;
            state.pending_lifecycle = None;
            state.lifecycle = resulting;
        })
    }

    fn mutate(&self, name: &str, op: &str, f: impl FnOnce(&mut ServiceState)) -> bool {
        let snapshot = {
            let mut table = self.lock();
            let Some(state) = table.entry_mut(name) else {
                debug!(service = %name, op, "ignoring update for untracked service");
                return false;
            };
            f(state);
            state.clone()
        };
        self.publish(snapshot);
        true
    }

    /// Stops publishing. Late writes from a finished session (a poll still in
    /// flight, a rollback of an aborted toggle) keep updating this table but
    /// never reach subscribers of the change channel.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn publish(&self, snapshot: ServiceState) {
        if self.is_detached() {
            debug!(service = %snapshot.name, "store detached, change not published");
            return;
        }
        // No subscribers is fine; the view may not be attached yet.
        let _ = self.changes.send(snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            display_name: name.to_uppercase(),
        }
    }

    fn store(names: &[&str]) -> (ServiceStateStore, broadcast::Receiver<ServiceState>) {
        let (tx, rx) = broadcast::channel(64);
        let descriptors: Vec<_> = names.iter().map(|n| descriptor(n)).collect();
        (ServiceStateStore::initialize(&descriptors, tx).unwrap(), rx)
    }

    #[test]
    fn initialize_creates_unknown_entries_in_order() {
        let (store, _rx) = store(&["web", "db"]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "web");
        assert_eq!(snapshot[1].display_name, "DB");
        assert!(
            snapshot
                .iter()
                .all(|s| s.lifecycle == Lifecycle::Unknown && !s.toggle_in_flight)
        );
        assert_eq!(snapshot[0].status_text, "Checking status...");
    }

    #[test]
    fn initialize_rejects_duplicates() {
        let (tx, _rx) = broadcast::channel(4);
        let err = ServiceStateStore::initialize(&[descriptor("web"), descriptor("web")], tx)
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(msg) if msg.contains("web")));
    }

    #[test]
    fn initialize_rejects_empty_names() {
        let (tx, _rx) = broadcast::channel(4);
        let err = ServiceStateStore::initialize(&[descriptor(" ")], tx).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn apply_poll_overwrites_and_notifies() {
        let (store, mut rx) = store(&["web"]);
        assert!(store.apply_poll("web", Lifecycle::Running, "Up 2s"));
        let state = store.get("web").unwrap();
        assert_eq!(state.lifecycle, Lifecycle::Running);
        assert_eq!(state.status_text, "Up 2s");

        let event = rx.try_recv().unwrap();
        assert_eq!(event, state);
    }

    #[test]
    fn apply_poll_for_untracked_service_is_a_noop() {
        let (store, mut rx) = store(&["web"]);
        assert!(!store.apply_poll("ghost", Lifecycle::Running, "Up"));
        assert_eq!(store.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn begin_toggle_is_exclusive_per_service() {
        let (store, _rx) = store(&["web", "db"]);
        assert!(store.begin_toggle("web"));
        assert!(!store.begin_toggle("web"));
        assert!(store.begin_toggle("db"));
        assert!(store.get("web").unwrap().toggle_in_flight);
    }

    #[test]
    fn rejected_begin_toggle_emits_nothing() {
        let (store, mut rx) = store(&["web"]);
        assert!(store.begin_toggle("web"));
        let _ = rx.try_recv().unwrap();
        assert!(!store.begin_toggle("web"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn end_toggle_releases_and_settles() {
        let (store, _rx) = store(&["web"]);
        store.apply_poll("web", Lifecycle::Stopped, "Exited (0)");
        assert!(store.begin_toggle("web"));
        store.commit_optimistic("web", Lifecycle::Running);

        let pending = store.get("web").unwrap();
        assert_eq!(pending.lifecycle, Lifecycle::Running);
        assert_eq!(pending.pending_lifecycle, Some(Lifecycle::Running));

        store.end_toggle("web", Lifecycle::Stopped);
        let settled = store.get("web").unwrap();
        assert!(!settled.toggle_in_flight);
        assert_eq!(settled.pending_lifecycle, None);
        assert_eq!(settled.lifecycle, Lifecycle::Stopped);
        assert!(store.begin_toggle("web"));
    }

    #[test]
    fn detached_store_updates_silently() {
        let (store, mut rx) = store(&["web"]);
        assert!(store.begin_toggle("web"));
        let _ = rx.try_recv().unwrap();

        store.detach();
        assert!(store.end_toggle("web", Lifecycle::Stopped));
        assert!(store.apply_poll("web", Lifecycle::Running, "Up late"));
        assert!(rx.try_recv().is_err());

        let web = store.get("web").unwrap();
        assert!(!web.toggle_in_flight);
        assert_eq!(web.status_text, "Up late");
    }

    #[test]
    fn get_unknown_service_fails() {
        let (store, _rx) = store(&["web"]);
        assert!(matches!(
            store.get("nope"),
            Err(SyncError::UnknownService(name)) if name == "nope"
        ));
    }
}
