//! Watches outlive the one-shot notifications of the service.
//!
//! Scenario:
//!
//! 1. Subscribe to data changes of a node.
//! 2. Change the node repeatedly, dropping the session in between.
//!
//! Expected Result:
//!
//! - Every change made while connected is delivered.
//! - The subscription is re-armed after the session comes back.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use zk_framework::EventType;
use zk_framework::MemoryEnsemble;
use zk_framework::WatchManager;

use crate::common::connected_framework;
use crate::common::eventually;
use crate::common::WAIT;

#[tokio::test]
async fn test_watch_survives_reconnect() {
    let ensemble = MemoryEnsemble::new();
    let framework = connected_framework(&ensemble, &["watch"]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();

    let watcher = WatchManager::new(framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set("node", tx, &[EventType::NodeDataChanged]).await.unwrap();

    ops.update("node", b"1").await.unwrap();
    let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.event_type, EventType::NodeDataChanged);
    assert_eq!(event.path, "/watch/node");

    ensemble.suspend();
    assert!(eventually(|| watcher.is_alive("node", &[EventType::NodeDataChanged]) == Some(false)).await);
    ensemble.resume();
    assert!(eventually(|| watcher.is_alive("node", &[EventType::NodeDataChanged]) == Some(true)).await);

    for value in ["2", "3"] {
        ops.update("node", value.as_bytes()).await.unwrap();
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::NodeDataChanged);
    }

    framework.stop().await.unwrap();
    assert!(eventually(|| watcher.is_empty()).await);
    assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
}
