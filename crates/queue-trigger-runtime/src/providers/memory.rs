//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Hides dequeued messages for their visibility timeout
//! - Issues a fresh pop receipt on every dequeue and visibility update
//! - Counts deliveries per message
//! - Expires messages after their time-to-live
//! - Supports one-shot failure injection per operation
//!
//! This provider is intended for:
//! - Unit and integration testing of queue consumers
//! - Development and prototyping
//! - Reference behaviour for cloud providers

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{MessageId, PopReceipt, QueueMessage, QueueName, Timestamp, VisibilityUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Time-to-live applied to every enqueued message
    pub message_ttl: Duration,
    /// Largest accepted message body in bytes
    pub max_message_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            message_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            max_message_size: 64 * 1024,
        }
    }
}

/// Queue operations that accept injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperation {
    Fetch,
    UpdateVisibility,
    Delete,
    Enqueue,
    CreateIfNotExists,
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    failures: HashMap<(QueueName, QueueOperation), VecDeque<QueueError>>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            failures: HashMap::new(),
            config,
        }
    }

    /// Pop the next injected failure for an operation, if any
    fn take_failure(&mut self, queue_name: &QueueName, operation: QueueOperation) -> Option<QueueError> {
        self.failures
            .get_mut(&(queue_name.clone(), operation))
            .and_then(|pending| pending.pop_front())
    }

    fn queue_mut(&mut self, queue_name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })
    }
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Messages in insertion order
    messages: Vec<StoredMessage>,
}

impl InMemoryQueue {
    fn purge_expired(&mut self, now: Timestamp) {
        self.messages.retain(|m| !m.is_expired(now));
    }

    /// Locate the current delivery identified by the message's receipt
    fn find_delivery(&mut self, message: &QueueMessage, now: Timestamp) -> Result<usize, QueueError> {
        let index = self
            .messages
            .iter()
            .position(|m| m.message_id == message.id)
            .ok_or_else(|| QueueError::MessageNotFound {
                message_id: message.id.to_string(),
            })?;

        let stored = &self.messages[index];
        let receipt_matches = stored.pop_receipt.as_ref() == Some(&message.pop_receipt);

        // A receipt dies with its invisibility window.
        if !receipt_matches || stored.is_visible(now) {
            return Err(QueueError::PopReceiptMismatch {
                message_id: message.id.to_string(),
            });
        }

        Ok(index)
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    insertion_time: Timestamp,
    expiration_time: Timestamp,
    dequeue_count: u32,
    next_visible_time: Timestamp,
    pop_receipt: Option<PopReceipt>,
}

impl StoredMessage {
    fn new(body: Bytes, ttl: Duration) -> Self {
        let now = Timestamp::now();
        Self {
            message_id: MessageId::new(),
            body,
            insertion_time: now,
            expiration_time: now.after(ttl),
            dequeue_count: 0,
            next_visible_time: now,
            pop_receipt: None,
        }
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expiration_time
    }

    fn is_visible(&self, now: Timestamp) -> bool {
        now >= self.next_visible_time
    }

    fn to_queue_message(&self) -> Option<QueueMessage> {
        let pop_receipt = self.pop_receipt.clone()?;
        Some(QueueMessage {
            id: self.message_id.clone(),
            pop_receipt,
            dequeue_count: self.dequeue_count,
            body: self.body.clone(),
            next_visible_time: Some(self.next_visible_time),
            insertion_time: Some(self.insertion_time),
            expiration_time: Some(self.expiration_time),
        })
    }
}

/// Point-in-time view of a stored message, for inspection and assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub body: Bytes,
    pub dequeue_count: u32,
    pub pop_receipt: Option<PopReceipt>,
    pub next_visible_time: Timestamp,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
}

impl From<&StoredMessage> for MessageSnapshot {
    fn from(stored: &StoredMessage) -> Self {
        Self {
            id: stored.message_id.clone(),
            body: stored.body.clone(),
            dequeue_count: stored.dequeue_count,
            pop_receipt: stored.pop_receipt.clone(),
            next_visible_time: stored.next_visible_time,
            insertion_time: stored.insertion_time,
            expiration_time: stored.expiration_time,
        }
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider hosting any number of named queues
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    /// Get a client for the named queue. The queue is not created.
    pub fn queue(&self, name: QueueName) -> InMemoryQueueClient {
        InMemoryQueueClient {
            name,
            storage: Arc::clone(&self.storage),
        }
    }

    /// Names of all existing queues
    pub fn queue_names(&self) -> Vec<QueueName> {
        read(&self.storage).queues.keys().cloned().collect()
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// Handle to one queue of an [`InMemoryProvider`]
#[derive(Clone)]
pub struct InMemoryQueueClient {
    name: QueueName,
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryQueueClient {
    /// Make the next call of `operation` on this queue fail with `error`.
    ///
    /// Failures queue up and are consumed one per call.
    pub fn inject_failure(&self, operation: QueueOperation, error: QueueError) {
        write(&self.storage)
            .failures
            .entry((self.name.clone(), operation))
            .or_default()
            .push_back(error);
    }

    /// Snapshot of every unexpired message, in insertion order
    pub fn messages(&self) -> Vec<MessageSnapshot> {
        let now = Timestamp::now();
        read(&self.storage)
            .queues
            .get(&self.name)
            .map(|queue| {
                queue
                    .messages
                    .iter()
                    .filter(|m| !m.is_expired(now))
                    .map(MessageSnapshot::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of messages a fetch could return right now
    pub fn visible_message_count(&self) -> usize {
        let now = Timestamp::now();
        read(&self.storage)
            .queues
            .get(&self.name)
            .map(|queue| {
                queue
                    .messages
                    .iter()
                    .filter(|m| !m.is_expired(now) && m.is_visible(now))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Check if the queue exists
    pub fn exists(&self) -> bool {
        read(&self.storage).queues.contains_key(&self.name)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    fn name(&self) -> &QueueName {
        &self.name
    }

    async fn fetch_batch(
        &self,
        max_count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut storage = write(&self.storage);
        if let Some(error) = storage.take_failure(&self.name, QueueOperation::Fetch) {
            return Err(error);
        }

        let now = Timestamp::now();
        let queue = storage.queue_mut(&self.name)?;
        queue.purge_expired(now);

        let mut batch = Vec::new();
        for stored in queue
            .messages
            .iter_mut()
            .filter(|m| m.is_visible(now))
            .take(max_count as usize)
        {
            stored.dequeue_count += 1;
            stored.pop_receipt = Some(PopReceipt::generate());
            stored.next_visible_time = now.after(visibility_timeout);
            batch.extend(stored.to_queue_message());
        }

        debug!(queue = %self.name, count = batch.len(), "Fetched message batch");
        Ok(batch)
    }

    async fn update_visibility(
        &self,
        message: &QueueMessage,
        visibility_timeout: Duration,
    ) -> Result<VisibilityUpdate, QueueError> {
        let mut storage = write(&self.storage);
        if let Some(error) = storage.take_failure(&self.name, QueueOperation::UpdateVisibility) {
            return Err(error);
        }

        let now = Timestamp::now();
        let queue = storage.queue_mut(&self.name)?;
        let index = queue.find_delivery(message, now)?;

        let stored = &mut queue.messages[index];
        let update = VisibilityUpdate {
            pop_receipt: PopReceipt::generate(),
            next_visible_time: now.after(visibility_timeout),
        };
        stored.pop_receipt = Some(update.pop_receipt.clone());
        stored.next_visible_time = update.next_visible_time;

        debug!(
            queue = %self.name,
            message_id = %message.id,
            next_visible_time = %update.next_visible_time,
            "Updated message visibility"
        );
        Ok(update)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut storage = write(&self.storage);
        if let Some(error) = storage.take_failure(&self.name, QueueOperation::Delete) {
            return Err(error);
        }

        let now = Timestamp::now();
        let queue = storage.queue_mut(&self.name)?;
        let index = queue.find_delivery(message, now)?;
        queue.messages.remove(index);

        debug!(queue = %self.name, message_id = %message.id, "Deleted message");
        Ok(())
    }

    async fn enqueue(&self, body: Bytes) -> Result<MessageId, QueueError> {
        let mut storage = write(&self.storage);
        if let Some(error) = storage.take_failure(&self.name, QueueOperation::Enqueue) {
            return Err(error);
        }

        let max_size = storage.config.max_message_size;
        if body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: body.len(),
                max_size,
            });
        }

        let ttl = storage.config.message_ttl;
        let queue = storage.queue_mut(&self.name)?;
        let stored = StoredMessage::new(body, ttl);
        let message_id = stored.message_id.clone();
        queue.messages.push(stored);

        debug!(queue = %self.name, message_id = %message_id, "Enqueued message");
        Ok(message_id)
    }

    async fn create_if_not_exists(&self) -> Result<bool, QueueError> {
        let mut storage = write(&self.storage);
        if let Some(error) = storage.take_failure(&self.name, QueueOperation::CreateIfNotExists) {
            return Err(error);
        }

        if storage.queues.contains_key(&self.name) {
            return Ok(false);
        }

        storage
            .queues
            .insert(self.name.clone(), InMemoryQueue::default());
        debug!(queue = %self.name, "Created queue");
        Ok(true)
    }

    async fn approximate_message_count(&self) -> Result<usize, QueueError> {
        let now = Timestamp::now();
        let storage = read(&self.storage);
        let queue = storage
            .queues
            .get(&self.name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: self.name.to_string(),
            })?;

        Ok(queue.messages.iter().filter(|m| !m.is_expired(now)).count())
    }
}

// Every mutation completes before its guard drops, so a poisoned lock still
// guards consistent state.
fn read(storage: &RwLock<QueueStorage>) -> RwLockReadGuard<'_, QueueStorage> {
    storage.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(storage: &RwLock<QueueStorage>) -> RwLockWriteGuard<'_, QueueStorage> {
    storage.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
