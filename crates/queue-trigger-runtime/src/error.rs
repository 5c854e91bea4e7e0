//! Error types for queue operations.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Pop receipt mismatch for message {message_id}")]
    PopReceiptMismatch { message_id: String },

    #[error("Queue '{queue_name}' is being deleted or is disabled")]
    QueueBeingDeleted { queue_name: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },
}

impl QueueError {
    /// Check if error is transient and the operation may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::PopReceiptMismatch { .. } => false,
            Self::QueueBeingDeleted { .. } => false,
            Self::ServerError { status, .. } => *status >= 500,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::MessageTooLarge { .. } => false,
        }
    }

    /// Check if the pop receipt used for the operation no longer identifies the
    /// current delivery of the message.
    ///
    /// Someone else either resolved the message or received it again.
    pub fn is_stale_receipt(&self) -> bool {
        matches!(
            self,
            Self::PopReceiptMismatch { .. } | Self::MessageNotFound { .. }
        )
    }

    /// Check if the message or its queue is gone, or the queue is going away
    pub fn is_message_or_queue_gone(&self) -> bool {
        matches!(
            self,
            Self::MessageNotFound { .. }
                | Self::QueueNotFound { .. }
                | Self::QueueBeingDeleted { .. }
        )
    }

    /// Check if the queue itself does not exist
    pub fn is_queue_not_found(&self) -> bool {
        matches!(self, Self::QueueNotFound { .. })
    }
}

/// Validation errors
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
