//! Tests for lease renewal module

use super::*;
use bytes::Bytes;
use queue_trigger_runtime::{
    InMemoryProvider, InMemoryQueueClient, QueueError, QueueName, QueueOperation,
};

const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(4);
const MINIMUM_INTERVAL: Duration = Duration::from_secs(1);

async fn leased_message() -> (InMemoryQueueClient, QueueMessage) {
    let provider = InMemoryProvider::default();
    let queue = provider.queue(QueueName::new("orders".to_string()).unwrap());
    queue.create_if_not_exists().await.unwrap();
    queue.enqueue(Bytes::from("m1")).await.unwrap();
    let message = queue
        .fetch_batch(1, VISIBILITY_TIMEOUT)
        .await
        .unwrap()
        .remove(0);
    (queue, message)
}

// ============================================================================
// Interval Tests
// ============================================================================

#[test]
fn test_renewal_interval_is_half_the_lease() {
    assert_eq!(
        renewal_interval(Duration::from_secs(10), Duration::from_secs(1)),
        Duration::from_secs(5)
    );
}

#[test]
fn test_renewal_interval_respects_minimum() {
    assert_eq!(
        renewal_interval(Duration::from_secs(1), Duration::from_secs(2)),
        Duration::from_secs(2)
    );
}

// ============================================================================
// Renewal Tests
// ============================================================================

mod renewing {
    use super::*;

    /// Verify that the renewer extends the lease periodically and hands back
    /// the receipt currently on file.
    #[tokio::test(start_paused = true)]
    async fn test_renews_and_tracks_latest_receipt() {
        let (queue, message) = leased_message().await;
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message.clone(),
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        // Renewals fire at 2s and 4s
        tokio::time::sleep(Duration::from_millis(4500)).await;
        let lease = renewer.stop().await;

        assert_eq!(lease.renewals, 2);
        assert_ne!(lease.message.pop_receipt, message.pop_receipt);
        assert_eq!(
            queue.messages()[0].pop_receipt,
            Some(lease.message.pop_receipt.clone())
        );

        // Only the latest receipt completes the message
        assert!(queue.delete(&message).await.is_err());
        queue.delete(&lease.message).await.unwrap();
    }

    /// Verify that stopping before the first tick performs no renewal.
    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_does_nothing() {
        let (queue, message) = leased_message().await;
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message.clone(),
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        let lease = renewer.stop().await;

        assert_eq!(lease.renewals, 0);
        assert_eq!(lease.message.pop_receipt, message.pop_receipt);
    }

    /// Verify that no renewal happens once the renewer has been stopped.
    #[tokio::test(start_paused = true)]
    async fn test_no_renewal_after_stop() {
        let (queue, message) = leased_message().await;
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message,
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let lease = renewer.stop().await;
        let receipt_at_stop = queue.messages()[0].pop_receipt.clone();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(lease.renewals, 1);
        assert_eq!(queue.messages()[0].pop_receipt, receipt_at_stop);
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failures {
    use super::*;

    /// Verify that a renewer stops quietly once the message is gone.
    #[tokio::test(start_paused = true)]
    async fn test_stops_when_message_deleted_elsewhere() {
        let (queue, message) = leased_message().await;
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message.clone(),
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        queue.delete(&message).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let lease = renewer.stop().await;

        assert_eq!(lease.renewals, 0);
        assert_eq!(lease.message.pop_receipt, message.pop_receipt);
    }

    /// Verify that a transient failure schedules the next attempt sooner.
    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_sooner() {
        let (queue, message) = leased_message().await;
        queue.inject_failure(
            QueueOperation::UpdateVisibility,
            QueueError::ServerError {
                status: 503,
                message: "server busy".to_string(),
            },
        );
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message,
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        // Fails at 2s, retries after max(2s / 2, 1s) at 3s
        tokio::time::sleep(Duration::from_millis(3500)).await;
        let lease = renewer.stop().await;

        assert_eq!(lease.renewals, 1);
    }

    /// Verify that a permanent failure stops renewal.
    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_stops_renewal() {
        let (queue, message) = leased_message().await;
        queue.inject_failure(
            QueueOperation::UpdateVisibility,
            QueueError::ServerError {
                status: 403,
                message: "forbidden".to_string(),
            },
        );
        let renewer = LeaseRenewer::start(
            Arc::new(queue.clone()),
            message,
            VISIBILITY_TIMEOUT,
            MINIMUM_INTERVAL,
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        let lease = renewer.stop().await;

        assert_eq!(lease.renewals, 0);
    }
}
