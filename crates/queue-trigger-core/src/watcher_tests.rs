//! Tests for watcher module

use super::*;
use std::time::Duration;

fn name(value: &str) -> QueueName {
    QueueName::new(value.to_string()).unwrap()
}

#[test]
fn test_notify_without_listeners_returns_false() {
    let watcher = SharedQueueWatcher::new();

    assert!(!watcher.notify(&name("orders")));
}

#[tokio::test]
async fn test_notify_wakes_waiting_listener() {
    let watcher = SharedQueueWatcher::new();
    let notify = Arc::new(Notify::new());
    watcher.register(name("orders"), &notify);

    let notified = notify.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();

    assert!(watcher.notify(&name("orders")));

    tokio::time::timeout(Duration::from_secs(1), notified)
        .await
        .expect("listener should have been woken");
}

#[tokio::test]
async fn test_notify_before_wait_is_not_remembered() {
    let watcher = SharedQueueWatcher::new();
    let notify = Arc::new(Notify::new());
    watcher.register(name("orders"), &notify);

    assert!(watcher.notify(&name("orders")));

    let woken = tokio::time::timeout(Duration::from_millis(50), notify.notified()).await;
    assert!(woken.is_err(), "a past notification must not end a later wait");
}

#[tokio::test]
async fn test_notify_is_scoped_to_queue() {
    let watcher = SharedQueueWatcher::new();
    let orders = Arc::new(Notify::new());
    let invoices = Arc::new(Notify::new());
    watcher.register(name("orders"), &orders);
    watcher.register(name("invoices"), &invoices);

    let notified = invoices.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();

    watcher.notify(&name("orders"));

    let woken = tokio::time::timeout(Duration::from_millis(50), notified).await;
    assert!(woken.is_err(), "invoices listener must not be woken");
}

#[test]
fn test_dropped_listeners_are_forgotten() {
    let watcher = SharedQueueWatcher::new();
    let first = Arc::new(Notify::new());
    let second = Arc::new(Notify::new());
    watcher.register(name("orders"), &first);
    watcher.register(name("orders"), &second);

    drop(first);
    assert!(watcher.notify(&name("orders")));

    drop(second);
    assert!(!watcher.notify(&name("orders")));
    assert!(watcher.watchers.read().unwrap().is_empty());
}
