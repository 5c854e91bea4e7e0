//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name.
///
/// Names are 3-63 characters of lowercase ASCII letters, digits and single
/// hyphens, and must start and end with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Suffix appended to a queue name to form its poison queue name
    pub const POISON_SUFFIX: &'static str = "-poison";

    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 3-63 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only lowercase ASCII letters, digits, and hyphens allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Name of the poison queue paired with this queue
    pub fn poison(&self) -> Result<Self, ValidationError> {
        Self::new(format!("{}{}", self.0, Self::POISON_SUFFIX))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Unique identifier for messages within a queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying one delivery of a message.
///
/// Deleting or updating a message requires the receipt handed out by the most
/// recent dequeue or visibility update. Any earlier receipt is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Generate a fresh receipt
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get receipt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset into the future by `duration`
    pub fn after(&self, duration: Duration) -> Self {
        let offset = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self(self.0.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message dequeued from a queue, carrying the metadata of this delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: MessageId,
    pub pop_receipt: PopReceipt,
    /// Number of times the provider has delivered this message, including this one
    pub dequeue_count: u32,
    pub body: Bytes,
    pub next_visible_time: Option<Timestamp>,
    pub insertion_time: Option<Timestamp>,
    pub expiration_time: Option<Timestamp>,
}

impl QueueMessage {
    /// Body decoded as UTF-8, if it is valid text
    pub fn body_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Record the receipt and visibility returned by a visibility update.
    ///
    /// Every later delete or update must use the new receipt.
    pub fn apply_visibility_update(&mut self, update: VisibilityUpdate) {
        self.pop_receipt = update.pop_receipt;
        self.next_visible_time = Some(update.next_visible_time);
    }
}

/// Result of a successful visibility update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityUpdate {
    pub pop_receipt: PopReceipt,
    pub next_visible_time: Timestamp,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
