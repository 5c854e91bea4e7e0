//! Client trait for visibility-timeout based queues.

use crate::error::QueueError;
use crate::message::{MessageId, QueueMessage, QueueName, VisibilityUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Operations on a single queue whose messages become invisible while leased.
///
/// A dequeued message stays hidden from other consumers until its visibility
/// timeout expires. The pop receipt returned with each delivery is required to
/// delete or update that delivery; a receipt replaced by a later dequeue or
/// visibility update fails with [`QueueError::PopReceiptMismatch`].
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Name of the queue this client operates on
    fn name(&self) -> &QueueName;

    /// Dequeue up to `max_count` visible messages, hiding each one for
    /// `visibility_timeout`.
    ///
    /// An empty result means no message is currently visible.
    async fn fetch_batch(
        &self,
        max_count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Hide `message` for `visibility_timeout` from now.
    ///
    /// Returns the new pop receipt and next visible time; the receipt held by
    /// `message` is invalid afterwards.
    async fn update_visibility(
        &self,
        message: &QueueMessage,
        visibility_timeout: Duration,
    ) -> Result<VisibilityUpdate, QueueError>;

    /// Delete the delivery identified by the message's pop receipt
    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Add a new message to the queue
    async fn enqueue(&self, body: Bytes) -> Result<MessageId, QueueError>;

    /// Create the queue if needed. Returns `true` when it was created.
    async fn create_if_not_exists(&self) -> Result<bool, QueueError>;

    /// Approximate number of messages in the queue, visible or not
    async fn approximate_message_count(&self) -> Result<usize, QueueError>;
}
