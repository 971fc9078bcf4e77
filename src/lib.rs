// SwitchBoard: a control panel for a fixed set of backend services.

pub mod error;
pub mod http;
pub mod server;
pub mod source;
pub mod sync;

pub use error::{SourceError, SyncError};
pub use source::{ConfigSource, StatusSource, ToggleRequester};
pub use sync::SyncEngine;
