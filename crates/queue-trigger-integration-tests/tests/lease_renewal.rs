//! Integration tests for lease renewal of long-running handlers
//!
//! These tests verify:
//! - A handler outliving its lease keeps the message invisible
//! - Completion uses the most recent pop receipt
//! - Earlier receipts are rejected after renewal
//! - Renewal beats lease expiry on the wall clock

mod common;

use common::{Outcome, ScriptedExecutor, TestQueues};
use queue_trigger_core::{
    CancellationToken, MessageDisposition, PollResult, QueueClient, QueueConfiguration, QueueError,
};
use std::time::Duration;

const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(4);

fn config() -> QueueConfiguration {
    QueueConfiguration::new()
        .with_visibility_timeout(VISIBILITY_TIMEOUT)
        .with_minimum_visibility_renewal_interval(Duration::from_secs(1))
}

/// Verify that a handler sleeping as long as the lease gets its message
/// renewed and that the message is deleted with the renewed receipt.
#[tokio::test(start_paused = true)]
async fn test_long_running_handler_renews_lease_before_completion() {
    let queues = TestQueues::new("orders").await;
    queues.enqueue(&["m1"]).await;
    let listener = queues.listener(
        ScriptedExecutor::with_delay(Outcome::Succeed, Duration::from_secs(4)),
        config(),
    );
    let message = queues.fetch_one(VISIBILITY_TIMEOUT).await;

    let processed = listener
        .process_message(message.clone(), VISIBILITY_TIMEOUT, CancellationToken::new())
        .await
        .unwrap();

    assert!(processed.renewals >= 1);
    assert_ne!(processed.message.pop_receipt, message.pop_receipt);
    assert_ne!(processed.message.next_visible_time, message.next_visible_time);
    assert_eq!(processed.disposition, MessageDisposition::Deleted);
    assert_eq!(queues.primary_count().await, 0);
}

/// Verify that the receipt handed out on dequeue is useless once the lease
/// has been renewed.
#[tokio::test(start_paused = true)]
async fn test_original_receipt_is_rejected_after_renewal() {
    let queues = TestQueues::new("orders").await;
    queues.enqueue(&["m1"]).await;
    let listener = queues.listener(
        ScriptedExecutor::with_delay(Outcome::Fail, Duration::from_secs(5)),
        config(),
    );
    let message = queues.fetch_one(VISIBILITY_TIMEOUT).await;

    let processed = listener
        .process_message(message.clone(), VISIBILITY_TIMEOUT, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(processed.renewals, 2);

    let stale = queues.queue.delete(&message).await;
    assert!(matches!(stale, Err(QueueError::PopReceiptMismatch { .. })));
}

/// Verify that the poll loop renews leases of in-flight messages as well.
#[tokio::test(start_paused = true)]
async fn test_poll_loop_keeps_in_flight_message_leased() {
    let queues = TestQueues::new("orders").await;
    queues.enqueue(&["m1"]).await;
    let mut listener = queues.listener(
        ScriptedExecutor::with_delay(Outcome::Succeed, Duration::from_secs(6)),
        config(),
    );
    let cancel = CancellationToken::new();

    assert_eq!(listener.poll(&cancel).await.unwrap(), PollResult::Dispatched(1));
    let fetched_receipt = queues.queue.messages()[0].pop_receipt.clone();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_ne!(queues.queue.messages()[0].pop_receipt, fetched_receipt);
    assert_eq!(listener.in_flight_count(), 1);

    listener.drain().await;
    assert_eq!(queues.primary_count().await, 0);
}

/// Verify against the wall clock that renewal keeps a short lease alive: a
/// competing consumer never receives the message while the handler runs.
#[tokio::test]
async fn test_short_lease_is_not_redelivered_while_handler_runs() {
    let lease = Duration::from_millis(300);
    let queues = TestQueues::new("orders").await;
    queues.enqueue(&["m1"]).await;
    let listener = queues.listener(
        ScriptedExecutor::with_delay(Outcome::Succeed, Duration::from_millis(700)),
        QueueConfiguration::new()
            .with_visibility_timeout(lease)
            .with_minimum_visibility_renewal_interval(Duration::from_millis(100)),
    );
    let message = queues.fetch_one(lease).await;

    let competitor = async {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
        let mut redelivered = 0;
        while tokio::time::Instant::now() < deadline {
            redelivered += queues.queue.fetch_batch(1, lease).await.unwrap().len();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        redelivered
    };

    let (processed, redelivered) = tokio::join!(
        listener.process_message(message, lease, CancellationToken::new()),
        competitor
    );
    let processed = processed.unwrap();

    assert_eq!(redelivered, 0);
    assert!(processed.renewals >= 2);
    assert_eq!(processed.disposition, MessageDisposition::Deleted);
    assert_eq!(queues.primary_count().await, 0);
}
