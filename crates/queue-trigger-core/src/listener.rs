//! # Queue Listener
//!
//! The poll, dispatch and complete control loop for one queue.
//!
//! Each [`QueueListener::poll`] call reaps finished messages, fetches a new
//! batch when the in-flight count has dropped to the batch threshold, spawns
//! one task per message and then waits: on an empty queue for the backoff
//! delay, otherwise until there is room for another batch. Both waits end
//! early when the cancellation token fires.
//!
//! Every message task follows the same sequence:
//!
//! 1. Ask the [`MessageProcessor`] whether to process the message
//! 2. Start a [`LeaseRenewer`] and run the [`TriggerExecutor`]
//! 3. Stop the renewer, then hand the latest receipt and the outcome back to
//!    the processor. A failure observed after cancellation skips this step
//!    and leaves the message to reappear when its lease expires.

use crate::backoff::BackoffScheduler;
use crate::config::{QueueConfiguration, MINIMUM_POLLING_INTERVAL};
use crate::error::ListenerError;
use crate::executor::{FunctionResult, TriggerExecutor};
use crate::processor::{MessageDisposition, MessageProcessor, PoisonMessageEvent, QueueProcessor};
use crate::renewal::LeaseRenewer;
use crate::watcher::SharedQueueWatcher;
use queue_trigger_runtime::{QueueClient, QueueError, QueueMessage};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Types
// ============================================================================

/// What a single [`QueueListener::poll`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// A batch of this many messages was dispatched
    Dispatched(usize),

    /// Nothing was fetched; the listener waited up to this long
    Backoff(Duration),

    /// Too many messages in flight to fetch another batch
    AtCapacity,

    /// The cancellation token fired
    Cancelled,
}

/// Outcome of processing one message
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    /// The message with the receipt used for completion
    pub message: QueueMessage,

    /// Handler outcome, `None` when the message was skipped
    pub result: Option<FunctionResult>,

    pub disposition: MessageDisposition,

    /// Number of lease renewals performed while the handler ran
    pub renewals: u32,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`QueueListener`]
pub struct QueueListenerBuilder {
    queue: Arc<dyn QueueClient>,
    executor: Arc<dyn TriggerExecutor>,
    poison_queue: Option<Arc<dyn QueueClient>>,
    config: QueueConfiguration,
    processor: Option<Arc<dyn MessageProcessor>>,
    watcher: Option<Arc<SharedQueueWatcher>>,
}

impl QueueListenerBuilder {
    /// Escalate messages that keep failing to this queue
    pub fn poison_queue(mut self, poison_queue: Arc<dyn QueueClient>) -> Self {
        self.poison_queue = Some(poison_queue);
        self
    }

    pub fn config(mut self, config: QueueConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`QueueProcessor`] completion policy.
    ///
    /// The poison queue set on this builder is ignored when a custom processor
    /// is supplied.
    pub fn processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Register with a shared watcher so producers can cut backoff short
    pub fn watcher(mut self, watcher: Arc<SharedQueueWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Validate the configuration and build the listener
    pub fn build(self) -> Result<QueueListener, ListenerError> {
        self.config.validate()?;

        let mut poison_events = None;
        let processor = match self.processor {
            Some(processor) => processor,
            None => {
                let mut processor =
                    QueueProcessor::new(Arc::clone(&self.queue), self.poison_queue, &self.config);
                if let Some(watcher) = &self.watcher {
                    processor = processor.with_watcher(Arc::clone(watcher));
                }
                poison_events = Some(processor.event_sender());
                Arc::new(processor) as Arc<dyn MessageProcessor>
            }
        };

        let wake = Arc::new(Notify::new());
        if let Some(watcher) = &self.watcher {
            watcher.register(self.queue.name().clone(), &wake);
        }

        let backoff = BackoffScheduler::new(MINIMUM_POLLING_INTERVAL, self.config.max_polling_interval);

        Ok(QueueListener {
            inner: Arc::new(ListenerInner {
                queue: self.queue,
                executor: self.executor,
                processor,
                config: self.config,
            }),
            processing: JoinSet::new(),
            backoff,
            found_message_since_last_delay: false,
            wake,
            poison_events,
        })
    }
}

// ============================================================================
// QueueListener
// ============================================================================

/// State shared with every message task
struct ListenerInner {
    queue: Arc<dyn QueueClient>,
    executor: Arc<dyn TriggerExecutor>,
    processor: Arc<dyn MessageProcessor>,
    config: QueueConfiguration,
}

/// Polls one queue and processes its messages concurrently
pub struct QueueListener {
    inner: Arc<ListenerInner>,
    processing: JoinSet<()>,
    backoff: BackoffScheduler,
    found_message_since_last_delay: bool,
    wake: Arc<Notify>,
    poison_events: Option<broadcast::Sender<PoisonMessageEvent>>,
}

impl QueueListener {
    /// Start building a listener for `queue` that runs `executor` per message
    pub fn builder(
        queue: Arc<dyn QueueClient>,
        executor: Arc<dyn TriggerExecutor>,
    ) -> QueueListenerBuilder {
        QueueListenerBuilder {
            queue,
            executor,
            poison_queue: None,
            config: QueueConfiguration::default(),
            processor: None,
            watcher: None,
        }
    }

    pub fn config(&self) -> &QueueConfiguration {
        &self.inner.config
    }

    /// Number of messages currently being processed
    pub fn in_flight_count(&self) -> usize {
        self.processing.len()
    }

    /// Subscribe to poison queue notifications.
    ///
    /// Returns `None` when a custom processor was supplied.
    pub fn subscribe_poison_events(&self) -> Option<broadcast::Receiver<PoisonMessageEvent>> {
        self.poison_events.as_ref().map(|sender| sender.subscribe())
    }

    /// Run one listener iteration followed by its cancellable wait.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Queue`] for provider failures that are neither
    /// transient nor recoverable by creating the queue.
    pub async fn poll(
        &mut self,
        cancellation: &CancellationToken,
    ) -> Result<PollResult, ListenerError> {
        if cancellation.is_cancelled() {
            return Ok(PollResult::Cancelled);
        }

        // Notifications only count from the start of this iteration.
        let wake = Arc::clone(&self.wake);
        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let outcome = self.execute_once(cancellation).await?;

        match outcome {
            PollResult::Backoff(delay) => {
                tokio::select! {
                    _ = cancellation.cancelled() => return Ok(PollResult::Cancelled),
                    _ = &mut notified => {
                        debug!(queue = %self.inner.queue.name(), "Backoff interrupted by new message notification");
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            PollResult::Dispatched(_) | PollResult::AtCapacity => {
                if !self.wait_for_capacity(cancellation).await {
                    return Ok(PollResult::Cancelled);
                }
            }
            PollResult::Cancelled => {}
        }

        Ok(outcome)
    }

    /// Poll until cancelled, then wait for in-flight messages to finish
    pub async fn run(&mut self, cancellation: CancellationToken) -> Result<(), ListenerError> {
        info!(
            queue = %self.inner.queue.name(),
            batch_size = self.inner.config.batch_size,
            max_dequeue_count = self.inner.config.max_dequeue_count,
            "Queue listener started"
        );

        let outcome = loop {
            match self.poll(&cancellation).await {
                Ok(PollResult::Cancelled) => break Ok(()),
                Ok(_) => {}
                Err(e) => {
                    error!(queue = %self.inner.queue.name(), error = %e, "Queue listener failed");
                    break Err(e);
                }
            }
        };

        let in_flight = self.in_flight_count();
        if in_flight > 0 {
            info!(queue = %self.inner.queue.name(), in_flight, "Draining in-flight messages");
        }
        self.drain().await;

        info!(queue = %self.inner.queue.name(), "Queue listener stopped");
        outcome
    }

    /// Wait for every in-flight message to finish
    pub async fn drain(&mut self) {
        while let Some(joined) = self.processing.join_next().await {
            log_join_error(joined);
        }
    }

    /// Process one message outside the poll loop.
    ///
    /// Returns once the disposition is durable.
    pub async fn process_message(
        &self,
        message: QueueMessage,
        visibility_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Result<ProcessedMessage, QueueError> {
        self.inner
            .process_message(message, visibility_timeout, cancellation)
            .await
    }

    async fn execute_once(
        &mut self,
        cancellation: &CancellationToken,
    ) -> Result<PollResult, ListenerError> {
        self.reap_completed();

        let config = &self.inner.config;
        let in_flight = self.processing.len() as u32;
        if in_flight > config.new_batch_threshold() || in_flight >= config.batch_size {
            return Ok(PollResult::AtCapacity);
        }

        let queue = &self.inner.queue;
        let max_count = config.batch_size - in_flight;
        let lease = config.lease_duration();

        let batch = match queue.fetch_batch(max_count, lease).await {
            Ok(batch) => batch,
            Err(e) if e.is_transient() || matches!(e, QueueError::QueueBeingDeleted { .. }) => {
                warn!(queue = %queue.name(), error = %e, "Fetching messages failed, backing off");
                return Ok(PollResult::Backoff(self.next_backoff()));
            }
            Err(e) if e.is_queue_not_found() => {
                info!(queue = %queue.name(), "Queue not found, creating it");
                queue.create_if_not_exists().await?;
                return Ok(PollResult::Backoff(self.next_backoff()));
            }
            Err(e) => return Err(e.into()),
        };

        if batch.is_empty() {
            return Ok(PollResult::Backoff(self.next_backoff()));
        }

        let count = batch.len();
        debug!(queue = %queue.name(), count, in_flight, "Dispatching message batch");

        for message in batch {
            let inner = Arc::clone(&self.inner);
            let token = cancellation.child_token();
            self.processing.spawn(async move {
                let queue_name = inner.queue.name().clone();
                let message_id = message.id.clone();
                match inner.process_message(message, lease, token).await {
                    Ok(processed) => debug!(
                        queue = %queue_name,
                        message_id = %message_id,
                        disposition = ?processed.disposition,
                        renewals = processed.renewals,
                        "Message processed"
                    ),
                    Err(e) => error!(
                        queue = %queue_name,
                        message_id = %message_id,
                        error = %e,
                        "Failed to complete message processing"
                    ),
                }
            });
        }

        self.found_message_since_last_delay = true;
        Ok(PollResult::Dispatched(count))
    }

    fn next_backoff(&mut self) -> Duration {
        let delay = self.backoff.next_delay(self.found_message_since_last_delay);
        self.found_message_since_last_delay = false;
        delay
    }

    fn reap_completed(&mut self) {
        while let Some(joined) = self.processing.try_join_next() {
            log_join_error(joined);
        }
    }

    /// Wait until another batch may be fetched. Returns `false` on cancellation.
    async fn wait_for_capacity(&mut self, cancellation: &CancellationToken) -> bool {
        let threshold = self.inner.config.new_batch_threshold() as usize;
        let batch_size = self.inner.config.batch_size as usize;

        while self.processing.len() > threshold || self.processing.len() >= batch_size {
            tokio::select! {
                _ = cancellation.cancelled() => return false,
                joined = self.processing.join_next() => match joined {
                    Some(joined) => log_join_error(joined),
                    None => break,
                },
            }
        }

        true
    }
}

impl ListenerInner {
    async fn process_message(
        &self,
        message: QueueMessage,
        visibility_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Result<ProcessedMessage, QueueError> {
        if !self.processor.begin_processing(&message).await {
            debug!(queue = %self.queue.name(), message_id = %message.id, "Message skipped");
            return Ok(ProcessedMessage {
                message,
                result: None,
                disposition: MessageDisposition::Skipped,
                renewals: 0,
            });
        }

        let renewer = LeaseRenewer::start(
            Arc::clone(&self.queue),
            message.clone(),
            visibility_timeout,
            self.config.minimum_visibility_renewal_interval,
        );

        let result = self.invoke(&message, cancellation.clone()).await;
        if !result.succeeded {
            warn!(
                queue = %self.queue.name(),
                message_id = %message.id,
                dequeue_count = message.dequeue_count,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Function execution failed"
            );
        }

        // No renewal may start once completion begins.
        let lease = renewer.stop().await;

        // Failures after cancellation leave the message to its lease.
        if cancellation.is_cancelled() && !result.succeeded {
            info!(
                queue = %self.queue.name(),
                message_id = %message.id,
                "Processing cancelled, leaving message for redelivery"
            );
            return Ok(ProcessedMessage {
                message: lease.message,
                result: Some(result),
                disposition: MessageDisposition::LeftInvisible,
                renewals: lease.renewals,
            });
        }

        let disposition = self
            .processor
            .complete_processing(&lease.message, &result)
            .await?;

        Ok(ProcessedMessage {
            message: lease.message,
            result: Some(result),
            disposition,
            renewals: lease.renewals,
        })
    }

    /// Run the handler in its own task so a panic becomes a failed result
    async fn invoke(&self, message: &QueueMessage, cancellation: CancellationToken) -> FunctionResult {
        let executor = Arc::clone(&self.executor);
        let message = message.clone();
        let handle = tokio::spawn(async move { executor.execute(&message, cancellation).await });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                FunctionResult::failure(format!("handler panicked: {}", panic_message(e.into_panic())))
            }
            Err(e) => FunctionResult::failure(format!("handler task failed: {}", e)),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Message processing task failed");
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
