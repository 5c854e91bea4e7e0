//! Common test utilities for queue-trigger integration tests
//!
//! This module provides:
//! - A scripted [`TriggerExecutor`] that records every invocation
//! - Helpers for creating primary and poison queues on an in-memory provider

use async_trait::async_trait;
use bytes::Bytes;
use queue_trigger_core::{
    CancellationToken, FunctionResult, QueueConfiguration, QueueListener, TriggerExecutor,
};
use queue_trigger_runtime::{InMemoryProvider, InMemoryQueueClient, QueueClient, QueueMessage, QueueName};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted Executor
// ============================================================================

/// Outcome a [`ScriptedExecutor`] produces for every message
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Outcome {
    Succeed,
    Fail,
}

/// Executor that records invocations, optionally sleeps and then returns a
/// fixed outcome
#[allow(dead_code)]
pub struct ScriptedExecutor {
    outcome: Outcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<QueueMessage>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: None,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    pub fn with_delay(outcome: Outcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    /// Messages handed to the executor, in invocation order
    pub fn calls(&self) -> Vec<QueueMessage> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of concurrent invocations observed
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriggerExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        message: &QueueMessage,
        _cancellation: CancellationToken,
    ) -> FunctionResult {
        self.calls.lock().unwrap().push(message.clone());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Succeed => FunctionResult::success(),
            Outcome::Fail => FunctionResult::failure("scripted failure"),
        }
    }
}

// ============================================================================
// Queue Fixtures
// ============================================================================

/// Primary queue and its poison queue on one in-memory provider
#[allow(dead_code)]
pub struct TestQueues {
    pub provider: InMemoryProvider,
    pub queue: InMemoryQueueClient,
    pub poison: InMemoryQueueClient,
}

#[allow(dead_code)]
impl TestQueues {
    /// Create the primary queue. The poison queue is created on demand.
    pub async fn new(name: &str) -> Self {
        let provider = InMemoryProvider::default();
        let name = QueueName::new(name.to_string()).unwrap();
        let queue = provider.queue(name.clone());
        queue.create_if_not_exists().await.unwrap();
        let poison = provider.queue(name.poison().unwrap());

        Self {
            provider,
            queue,
            poison,
        }
    }

    pub async fn enqueue(&self, bodies: &[&'static str]) {
        for body in bodies {
            self.queue.enqueue(Bytes::from(*body)).await.unwrap();
        }
    }

    /// Dequeue exactly one message with the given lease
    pub async fn fetch_one(&self, lease: Duration) -> QueueMessage {
        let mut batch = self.queue.fetch_batch(1, lease).await.unwrap();
        assert_eq!(batch.len(), 1, "expected one visible message");
        batch.remove(0)
    }

    pub async fn primary_count(&self) -> usize {
        self.queue.approximate_message_count().await.unwrap()
    }

    pub fn poison_bodies(&self) -> Vec<Bytes> {
        self.poison.messages().into_iter().map(|m| m.body).collect()
    }

    /// Listener over the primary queue with poison escalation enabled
    pub fn listener(
        &self,
        executor: Arc<dyn TriggerExecutor>,
        config: QueueConfiguration,
    ) -> QueueListener {
        QueueListener::builder(Arc::new(self.queue.clone()), executor)
            .poison_queue(Arc::new(self.poison.clone()))
            .config(config)
            .build()
            .unwrap()
    }
}

/// Wait until `condition` holds, checking every 10ms, for at most `timeout`
#[allow(dead_code)]
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met before timeout");
}
