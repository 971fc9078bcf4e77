// Error types of the sync core and its collaborators.

use thiserror::Error;

/// Failure reported by one of the external collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid service configuration: {0}")]
    Config(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(#[source] SourceError),

    #[error("status poll failed: {0}")]
    PollFailure(#[source] SourceError),

    #[error("toggle of {service} failed: {source}")]
    ToggleFailure {
        service: String,
        #[source]
        source: SourceError,
    },

    #[error("sync engine is not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, SyncError>;
