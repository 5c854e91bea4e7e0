//! Cross-listener wake-up signals.
//!
//! A listener backing off on an empty queue registers its wake handle under
//! the queue's name. Anything that writes to that queue in-process (the poison
//! path, for one) can then cut the backoff short instead of waiting for the
//! next poll.

use queue_trigger_runtime::QueueName;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::Notify;
use tracing::trace;

/// Registry of listeners interested in new messages per queue.
///
/// Handles are held weakly, so a dropped listener falls out of the registry
/// on the next register or notify for its queue.
#[derive(Debug, Default)]
pub struct SharedQueueWatcher {
    watchers: RwLock<HashMap<QueueName, Vec<Weak<Notify>>>>,
}

impl SharedQueueWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wake handle for `queue`
    pub fn register(&self, queue: QueueName, notify: &Arc<Notify>) {
        let mut watchers = self
            .watchers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handles = watchers.entry(queue).or_default();
        handles.retain(|handle| handle.strong_count() > 0);
        handles.push(Arc::downgrade(notify));
    }

    /// Wake every listener currently waiting on `queue`.
    ///
    /// Listeners that are not waiting are not affected; no wake-up is stored
    /// for a later wait. Returns `true` when at least one live listener is
    /// registered.
    pub fn notify(&self, queue: &QueueName) -> bool {
        let mut watchers = self
            .watchers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(handles) = watchers.get_mut(queue) else {
            return false;
        };

        let mut live = 0;
        handles.retain(|handle| match handle.upgrade() {
            Some(notify) => {
                notify.notify_waiters();
                live += 1;
                true
            }
            None => false,
        });

        if handles.is_empty() {
            watchers.remove(queue);
        }

        if live > 0 {
            trace!(queue = %queue, listeners = live, "Waking queue listeners");
        }
        live > 0
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
