// Defines the data structures shared between the sync core and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Poll interval used when the configuration leaves it unset or non-positive.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Status text shown for a service before its first poll lands.
pub const INITIAL_STATUS_TEXT: &str = "Checking status...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Configuration handed to the engine by its `ConfigSource`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelConfig {
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub poll_interval_seconds: Option<i64>,
}

impl PanelConfig {
    pub fn poll_interval(&self) -> Duration {
        poll_interval_from(self.poll_interval_seconds)
    }
}

pub fn poll_interval_from(seconds: Option<i64>) -> Duration {
    match seconds {
        Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
        _ => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
    }
}

/// Coarse running/stopped classification of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Unknown,
    Running,
    Stopped,
}

impl Lifecycle {
    /// Maps a backend state string (`docker ps` vocabulary) onto a lifecycle.
    pub fn classify(state: &str) -> Self {
        match state {
            "running" => Lifecycle::Running,
            "exited" | "stopped" => Lifecycle::Stopped,
            _ => Lifecycle::Unknown,
        }
    }

    /// The lifecycle a toggle aims for. Anything not running gets started.
    pub fn toggled(self) -> Self {
        match self {
            Lifecycle::Running => Lifecycle::Stopped,
            Lifecycle::Stopped | Lifecycle::Unknown => Lifecycle::Running,
        }
    }

    pub fn is_running(self) -> bool {
        self == Lifecycle::Running
    }
}

/// Snapshot of one service as seen by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceState {
    pub name: String,
    pub display_name: String,
    pub lifecycle: Lifecycle,
    pub status_text: String,
    pub toggle_in_flight: bool,
    /// Optimistic lifecycle, only set while a toggle is in flight.
    pub pending_lifecycle: Option<Lifecycle>,
}

impl ServiceState {
    pub fn new(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            display_name: descriptor.display_name.clone(),
            lifecycle: Lifecycle::Unknown,
            status_text: INITIAL_STATUS_TEXT.to_string(),
            toggle_in_flight: false,
            pending_lifecycle: None,
        }
    }
}

/// Process-wide reachability of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
    /// Carries a marker telling which path failed, e.g. `"toggle error"`.
    Error(String),
}

impl Connectivity {
    pub const INIT_ERROR: &'static str = "error";
    pub const TOGGLE_ERROR: &'static str = "toggle error";

    pub fn toggle_error() -> Self {
        Connectivity::Error(Self::TOGGLE_ERROR.to_string())
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("ONLINE"),
            Connectivity::Offline => f.write_str("OFFLINE"),
            Connectivity::Error(marker) => f.write_str(&marker.to_uppercase()),
        }
    }
}

/// One entry of a `StatusSource` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusReport {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Up,
    Down,
}

impl ToggleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ToggleAction::Up => "up",
            ToggleAction::Down => "down",
        }
    }
}

/// Wire body of a toggle command: exactly one of `up` / `down` names the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl ToggleRequest {
    pub fn new(action: ToggleAction, service: impl Into<String>) -> Self {
        let service = Some(service.into());
        match action {
            ToggleAction::Up => Self {
                up: service,
                down: None,
            },
            ToggleAction::Down => Self {
                up: None,
                down: service,
            },
        }
    }

    /// Returns the action and service, or `None` unless exactly one key is set.
    pub fn action(&self) -> Option<(ToggleAction, &str)> {
        match (self.up.as_deref(), self.down.as_deref()) {
            (Some(name), None) if !name.is_empty() => Some((ToggleAction::Up, name)),
            (None, Some(name)) if !name.is_empty() => Some((ToggleAction::Down, name)),
            _ => None,
        }
    }
}
