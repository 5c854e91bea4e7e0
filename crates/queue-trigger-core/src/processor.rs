//! # Message Completion
//!
//! Turns a handler outcome into exactly one terminal queue operation.
//!
//! - Success deletes the message
//! - Failure below the retry budget releases the message for redelivery
//! - Failure at or above the retry budget copies the body to the poison
//!   queue, then deletes the original
//!
//! The poison write always happens before the delete, so a crash in between
//! can only duplicate into the poison queue.

use crate::config::QueueConfiguration;
use crate::executor::FunctionResult;
use crate::watcher::SharedQueueWatcher;
use async_trait::async_trait;
use queue_trigger_runtime::{QueueClient, QueueError, QueueMessage, QueueName};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const POISON_EVENT_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Terminal action taken for a processed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Removed from the primary queue after success
    Deleted,

    /// Made visible again after the given delay for another attempt
    Released { visible_after: Duration },

    /// Left to reappear when its current lease expires
    LeftInvisible,

    /// Copied to the poison queue and removed from the primary queue
    Poisoned { poison_queue: QueueName },

    /// The delivery was no longer ours to complete (stale receipt, message or
    /// queue gone)
    Abandoned,

    /// Rejected by the begin-processing hook
    Skipped,
}

/// Published whenever a message is moved to a poison queue
#[derive(Debug, Clone)]
pub struct PoisonMessageEvent {
    pub poison_queue: QueueName,
    pub message: QueueMessage,
}

/// Completion policy consulted by the listener for every message.
///
/// # Behavior
///
/// - [`begin_processing`](Self::begin_processing) runs before the handler;
///   returning `false` skips the message without touching the queue
/// - [`complete_processing`](Self::complete_processing) runs after the lease
///   renewer has stopped and performs the terminal queue operation
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Decide whether the message should be handed to the handler at all.
    async fn begin_processing(&self, _message: &QueueMessage) -> bool {
        true
    }

    /// Dispose of the message according to the handler outcome.
    ///
    /// # Arguments
    ///
    /// - `message`: The message carrying its most recent pop receipt
    /// - `result`: Outcome of the handler invocation
    ///
    /// # Returns
    ///
    /// - `Ok(MessageDisposition)`: The disposition is durable
    /// - `Err(QueueError)`: The queue rejected the terminal operation
    async fn complete_processing(
        &self,
        message: &QueueMessage,
        result: &FunctionResult,
    ) -> Result<MessageDisposition, QueueError>;
}

// ============================================================================
// QueueProcessor
// ============================================================================

/// Default completion policy with poison queue escalation
pub struct QueueProcessor {
    queue: Arc<dyn QueueClient>,
    poison_queue: Option<Arc<dyn QueueClient>>,
    max_dequeue_count: u32,
    visibility_timeout: Duration,
    watcher: Option<Arc<SharedQueueWatcher>>,
    poison_events: broadcast::Sender<PoisonMessageEvent>,
}

impl QueueProcessor {
    /// Create a processor for `queue`, escalating to `poison_queue` when set
    pub fn new(
        queue: Arc<dyn QueueClient>,
        poison_queue: Option<Arc<dyn QueueClient>>,
        config: &QueueConfiguration,
    ) -> Self {
        let (poison_events, _) = broadcast::channel(POISON_EVENT_CAPACITY);
        Self {
            queue,
            poison_queue,
            max_dequeue_count: config.max_dequeue_count,
            visibility_timeout: config.visibility_timeout,
            watcher: None,
            poison_events,
        }
    }

    /// Wake listeners of the poison queue after each escalation
    pub fn with_watcher(mut self, watcher: Arc<SharedQueueWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Subscribe to poison queue notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PoisonMessageEvent> {
        self.poison_events.subscribe()
    }

    /// Sender side of the poison notifications, for sharing with other owners
    pub fn event_sender(&self) -> broadcast::Sender<PoisonMessageEvent> {
        self.poison_events.clone()
    }

    /// Remove the message from the primary queue
    pub async fn delete_message(
        &self,
        message: &QueueMessage,
    ) -> Result<MessageDisposition, QueueError> {
        match self.queue.delete(message).await {
            Ok(()) => {
                debug!(queue = %self.queue.name(), message_id = %message.id, "Deleted message");
                Ok(MessageDisposition::Deleted)
            }
            Err(e) if is_already_resolved(&e) => {
                debug!(
                    queue = %self.queue.name(),
                    message_id = %message.id,
                    error = %e,
                    "Message already resolved, skipping delete"
                );
                Ok(MessageDisposition::Abandoned)
            }
            Err(e) => Err(e),
        }
    }

    /// Make the message visible again after `visible_after`
    pub async fn release_message(
        &self,
        message: &QueueMessage,
        visible_after: Duration,
    ) -> Result<MessageDisposition, QueueError> {
        match self.queue.update_visibility(message, visible_after).await {
            Ok(update) => {
                debug!(
                    queue = %self.queue.name(),
                    message_id = %message.id,
                    next_visible_time = %update.next_visible_time,
                    "Released message for retry"
                );
                Ok(MessageDisposition::Released { visible_after })
            }
            Err(e) if is_already_resolved(&e) => {
                debug!(
                    queue = %self.queue.name(),
                    message_id = %message.id,
                    error = %e,
                    "Message already resolved, skipping release"
                );
                Ok(MessageDisposition::Abandoned)
            }
            Err(e) => Err(e),
        }
    }

    /// Write the message body to the poison queue, creating it if needed
    async fn copy_to_poison_queue(
        &self,
        message: &QueueMessage,
        poison_queue: &dyn QueueClient,
    ) -> Result<(), QueueError> {
        match poison_queue.enqueue(message.body.clone()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_queue_not_found() => {
                info!(queue = %poison_queue.name(), "Creating poison queue");
                poison_queue.create_if_not_exists().await?;
                poison_queue.enqueue(message.body.clone()).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_poison_message(
        &self,
        message: &QueueMessage,
        poison_queue: &dyn QueueClient,
    ) -> Result<MessageDisposition, QueueError> {
        let poison_name = poison_queue.name().clone();

        warn!(
            queue = %self.queue.name(),
            message_id = %message.id,
            dequeue_count = message.dequeue_count,
            max_dequeue_count = self.max_dequeue_count,
            poison_queue = %poison_name,
            "Message has reached MaxDequeueCount of {}. Moving message to queue '{}'.",
            self.max_dequeue_count,
            poison_name
        );

        self.copy_to_poison_queue(message, poison_queue).await?;
        self.delete_message(message).await?;

        // No subscribers is fine.
        let _ = self.poison_events.send(PoisonMessageEvent {
            poison_queue: poison_name.clone(),
            message: message.clone(),
        });

        if let Some(watcher) = &self.watcher {
            watcher.notify(&poison_name);
        }

        Ok(MessageDisposition::Poisoned {
            poison_queue: poison_name,
        })
    }
}

#[async_trait]
impl MessageProcessor for QueueProcessor {
    async fn complete_processing(
        &self,
        message: &QueueMessage,
        result: &FunctionResult,
    ) -> Result<MessageDisposition, QueueError> {
        if result.succeeded {
            return self.delete_message(message).await;
        }

        match &self.poison_queue {
            Some(poison_queue) if message.dequeue_count >= self.max_dequeue_count => {
                self.handle_poison_message(message, poison_queue.as_ref())
                    .await
            }
            _ if self.visibility_timeout.is_zero() => Ok(MessageDisposition::LeftInvisible),
            _ => self.release_message(message, self.visibility_timeout).await,
        }
    }
}

/// Errors meaning the delivery can no longer be completed by us
fn is_already_resolved(error: &QueueError) -> bool {
    error.is_stale_receipt() || error.is_message_or_queue_gone()
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
