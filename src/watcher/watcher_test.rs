use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::test_utils::started_framework;
use crate::test_utils::test_framework;
use crate::test_utils::wait_until;
use crate::MemoryEnsemble;

async fn next_event(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event should arrive in time")
        .expect("subscription should still be open")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) {
    assert!(
        timeout(Duration::from_millis(150), rx.recv()).await.is_err(),
        "no event expected"
    );
}

#[test]
fn test_registration_key_is_type_order_independent() {
    let a = normalize_types(&[EventType::NodeDataChanged, EventType::NodeCreated]);
    let b = normalize_types(&[EventType::NodeCreated, EventType::NodeDataChanged, EventType::NodeCreated]);
    assert_eq!(a, b);
    assert_eq!(registration_key(&a, "/app/node"), "1-3-/app/node");
}

#[test]
fn test_no_types_means_every_type() {
    assert_eq!(normalize_types(&[]), EventType::ALL.to_vec());
    assert_eq!(registration_key(&normalize_types(&[]), "/n"), "1-2-3-4-/n");
}

#[tokio::test]
async fn test_set_before_start_fails() {
    let framework = test_framework(&MemoryEnsemble::new(), &[]);
    let watcher = WatchManager::new(framework);
    let (tx, _rx) = mpsc::unbounded_channel();

    let e = watcher.set("node", tx, &[]).await.unwrap_err();
    assert!(e.is_framework_not_yet_started());
}

#[tokio::test]
async fn test_set_on_missing_node_fails() {
    let framework = started_framework(&MemoryEnsemble::new(), &["app"]).await;
    let watcher = WatchManager::new(framework.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    let e = watcher.set("missing", tx, &[]).await.unwrap_err();
    assert!(e.is_unknown_node());
    assert!(watcher.is_empty());
    assert_eq!(framework.listener_counts(), (0, 0));
}

#[tokio::test]
async fn test_data_changes_are_delivered_continuously() {
    let framework = started_framework(&MemoryEnsemble::new(), &["app"]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();

    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[EventType::NodeDataChanged]).await.unwrap();

    for value in ["one", "two", "three"] {
        ops.update("node", value.as_bytes()).await.unwrap();
        let event = next_event(&mut rx).await;
        assert_eq!(event.event_type, EventType::NodeDataChanged);
        assert_eq!(event.path, "/app/node");
    }
}

#[tokio::test]
async fn test_only_requested_types_are_forwarded() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();

    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[EventType::NodeDeleted]).await.unwrap();

    ops.update("node", b"ignored").await.unwrap();
    assert_quiet(&mut rx).await;

    ops.delete("node").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeDeleted);
}

#[tokio::test]
async fn test_children_changes_are_delivered() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    let ops = framework.operations();
    ops.create("parent").await.unwrap();

    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("parent", tx, &[EventType::NodeChildrenChanged]).await.unwrap();

    ops.create("parent/a").await.unwrap();
    let event = next_event(&mut rx).await;
    assert_eq!(event.event_type, EventType::NodeChildrenChanged);
    assert_eq!(event.path, "/parent");

    ops.create("parent/b").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeChildrenChanged);
}

#[tokio::test]
async fn test_deletion_is_reported_once_and_recreation_observed() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();

    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[]).await.unwrap();

    ops.delete("node").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeDeleted);
    assert_quiet(&mut rx).await;

    ops.create("node").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeCreated);

    ops.create("node/child").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeChildrenChanged);
}

#[tokio::test]
async fn test_duplicate_subscription_fails() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    framework.operations().create("node").await.unwrap();
    let watcher = WatchManager::new(framework.clone());

    let (tx, _rx) = mpsc::unbounded_channel();
    watcher
        .set("node", tx.clone(), &[EventType::NodeCreated, EventType::NodeDataChanged])
        .await
        .unwrap();
    let e = watcher
        .set("node", tx, &[EventType::NodeDataChanged, EventType::NodeCreated])
        .await
        .unwrap_err();
    assert!(e.is_listener_already_exists());
    assert_eq!(watcher.len(), 1);
}

#[tokio::test]
async fn test_managers_do_not_share_subscriptions() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    framework.operations().create("node").await.unwrap();

    let first = WatchManager::new(framework.clone());
    let second = WatchManager::new(framework.clone());
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    first.set("node", tx_a, &[]).await.unwrap();
    second.set("node", tx_b, &[]).await.unwrap();
    assert_ne!(first.id(), second.id());

    framework.operations().update("node", b"x").await.unwrap();
    assert_eq!(next_event(&mut rx_a).await.event_type, EventType::NodeDataChanged);
    assert_eq!(next_event(&mut rx_b).await.event_type, EventType::NodeDataChanged);
}

#[tokio::test]
async fn test_unset_stops_delivery_and_unregisters() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();
    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[]).await.unwrap();
    assert_eq!(framework.listener_counts(), (1, 1));

    watcher.unset("node", &[]).unwrap();

    assert!(!watcher.is_watching("node", &[]));
    assert_eq!(framework.listener_counts(), (0, 0));
    ops.update("node", b"x").await.unwrap();
    // The task ends and drops its sender
    let closed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_unset_unknown_subscription_fails() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    let watcher = WatchManager::new(framework);

    let e = watcher.unset("nothing", &[EventType::NodeCreated]).unwrap_err();
    assert!(e.is_listener_not_found());
}

#[tokio::test]
async fn test_stop_ends_subscriptions() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    framework.operations().create("node").await.unwrap();
    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[]).await.unwrap();

    framework.stop().await.unwrap();

    assert!(wait_until(|| watcher.is_empty(), Duration::from_secs(5)).await);
    let closed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_dropped_consumer_ends_subscription() {
    let framework = started_framework(&MemoryEnsemble::new(), &[]).await;
    framework.operations().create("node").await.unwrap();
    let watcher = WatchManager::new(framework.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[]).await.unwrap();

    drop(rx);
    framework.operations().update("node", b"x").await.unwrap();

    assert!(wait_until(|| watcher.is_empty(), Duration::from_secs(5)).await);
    assert_eq!(framework.listener_counts(), (0, 0));
}

#[tokio::test]
async fn test_watch_is_rearmed_after_reconnect() {
    let ensemble = MemoryEnsemble::new();
    let framework = started_framework(&ensemble, &[]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();
    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[EventType::NodeDataChanged]).await.unwrap();

    ensemble.suspend();
    assert!(
        wait_until(
            || watcher.is_alive("node", &[EventType::NodeDataChanged]) == Some(false),
            Duration::from_secs(5)
        )
        .await
    );
    ensemble.resume();
    framework.wait_connection(Duration::from_secs(5)).await.unwrap();
    assert!(
        wait_until(
            || watcher.is_alive("node", &[EventType::NodeDataChanged]) == Some(true),
            Duration::from_secs(5)
        )
        .await
    );

    ops.update("node", b"after").await.unwrap();
    assert_eq!(next_event(&mut rx).await.event_type, EventType::NodeDataChanged);
    assert!(watcher.is_watching("node", &[EventType::NodeDataChanged]));
}
