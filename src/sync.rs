// Client-side synchronization core: polling, optimistic toggles and rollback.

pub mod connectivity;
pub mod engine;
pub mod model;
pub mod poller;
pub mod scheduler;
pub mod store;
pub mod toggle;

pub use connectivity::ConnectivityCell;
pub use engine::SyncEngine;
pub use model::{
    Connectivity, Lifecycle, PanelConfig, ServiceDescriptor, ServiceState, ServiceStatusReport,
    ToggleAction, ToggleRequest,
};
pub use poller::{PollOutcome, StatusPoller};
pub use scheduler::Scheduler;
pub use store::ServiceStateStore;
pub use toggle::{PendingToggle, ToggleController, ToggleOutcome};
