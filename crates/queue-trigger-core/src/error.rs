//! Listener error types.

use crate::config::ConfigError;
use queue_trigger_runtime::QueueError;
use thiserror::Error;

/// Errors that stop a listener
#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}
