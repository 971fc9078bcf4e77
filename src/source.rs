// Collaborator traits the sync core reaches the backend through.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::sync::model::{PanelConfig, ServiceStatusReport, ToggleRequest};

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetches the service list and poll interval.
    async fn fetch_config(&self) -> Result<PanelConfig, SourceError>;
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches the current status of every service the backend knows about.
    async fn fetch_statuses(&self) -> Result<Vec<ServiceStatusReport>, SourceError>;
}

#[async_trait]
pub trait ToggleRequester: Send + Sync {
    /// Sends one start/stop command. Non-success responses are errors.
    async fn request_toggle(&self, request: &ToggleRequest) -> Result<(), SourceError>;
}
