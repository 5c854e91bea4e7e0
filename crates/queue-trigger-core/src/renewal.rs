//! # Lease Renewal
//!
//! Keeps one in-flight message invisible while its handler runs.
//!
//! A [`LeaseRenewer`] owns a background task that extends the message's
//! visibility window every half lease (never more often than the configured
//! minimum renewal interval) and swaps in the pop receipt returned by each
//! update. Stopping the renewer cancels its token before any completion call
//! is made. A renewal already on the wire is allowed to finish so the receipt
//! handed back from [`LeaseRenewer::stop`] is always the latest one.

use queue_trigger_runtime::{QueueClient, QueueMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

/// Time between two renewals of a lease of length `visibility_timeout`
pub fn renewal_interval(visibility_timeout: Duration, minimum_interval: Duration) -> Duration {
    (visibility_timeout / 2).max(minimum_interval)
}

/// Final state of a message once its renewer has stopped
#[derive(Debug, Clone)]
pub struct RenewedLease {
    /// Message carrying the most recent pop receipt and visibility time
    pub message: QueueMessage,

    /// Number of successful renewals
    pub renewals: u32,
}

/// Background lease extension for a single message
///
/// Dropping the renewer without calling [`stop`](Self::stop) also cancels the
/// background task.
pub struct LeaseRenewer {
    guard: DropGuard,
    handle: JoinHandle<RenewedLease>,
    original: QueueMessage,
}

impl LeaseRenewer {
    /// Start renewing `message` on `queue`.
    ///
    /// Each renewal requests a fresh `visibility_timeout`.
    pub fn start(
        queue: Arc<dyn QueueClient>,
        message: QueueMessage,
        visibility_timeout: Duration,
        minimum_interval: Duration,
    ) -> Self {
        let cancellation = CancellationToken::new();
        let original = message.clone();
        let handle = tokio::spawn(renew_until_cancelled(
            queue,
            message,
            visibility_timeout,
            minimum_interval,
            cancellation.clone(),
        ));

        Self {
            guard: cancellation.drop_guard(),
            handle,
            original,
        }
    }

    /// Stop renewing and return the message with its latest receipt.
    ///
    /// Waits for an in-flight renewal call to complete.
    pub async fn stop(self) -> RenewedLease {
        let LeaseRenewer {
            guard,
            handle,
            original,
        } = self;
        drop(guard);

        match handle.await {
            Ok(lease) => lease,
            Err(e) => {
                error!(
                    message_id = %original.id,
                    error = %e,
                    "Lease renewal task failed"
                );
                RenewedLease {
                    message: original,
                    renewals: 0,
                }
            }
        }
    }
}

async fn renew_until_cancelled(
    queue: Arc<dyn QueueClient>,
    mut message: QueueMessage,
    visibility_timeout: Duration,
    minimum_interval: Duration,
    cancellation: CancellationToken,
) -> RenewedLease {
    let interval = renewal_interval(visibility_timeout, minimum_interval);
    let mut delay = interval;
    let mut consecutive_failures: u32 = 0;
    let mut renewals: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        // Completion may have started while the timer fired.
        if cancellation.is_cancelled() {
            break;
        }

        match queue.update_visibility(&message, visibility_timeout).await {
            Ok(update) => {
                message.apply_visibility_update(update);
                renewals += 1;
                consecutive_failures = 0;
                delay = interval;

                debug!(
                    queue = %queue.name(),
                    message_id = %message.id,
                    renewals,
                    "Renewed message lease"
                );
            }
            Err(e) if e.is_stale_receipt() || e.is_message_or_queue_gone() => {
                debug!(
                    queue = %queue.name(),
                    message_id = %message.id,
                    error = %e,
                    "Message no longer held, stopping lease renewal"
                );
                break;
            }
            Err(e) if e.is_transient() => {
                consecutive_failures += 1;
                delay = (interval / (consecutive_failures + 1)).max(minimum_interval);

                warn!(
                    queue = %queue.name(),
                    message_id = %message.id,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Lease renewal failed, retrying"
                );
            }
            Err(e) => {
                error!(
                    queue = %queue.name(),
                    message_id = %message.id,
                    error = %e,
                    "Lease renewal failed permanently"
                );
                break;
            }
        }
    }

    RenewedLease { message, renewals }
}

#[cfg(test)]
#[path = "renewal_tests.rs"]
mod tests;
