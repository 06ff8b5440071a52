//! A framework survives losing its session.
//!
//! Scenario:
//!
//! 1. Connect and write a node.
//! 2. Suspend the ensemble: the session drops and reconnects are refused.
//! 3. Resume the ensemble.
//!
//! Expected Result:
//!
//! - Operations fail with a not-ready error once the stale session is dropped.
//! - The framework reconnects on its own and the node is readable again.
//! - Expiring the session is recovered from the same way.

use zk_framework::ConnectionState;
use zk_framework::MemoryEnsemble;

use crate::common::connected_framework;
use crate::common::eventually;
use crate::common::WAIT;

#[tokio::test]
async fn test_framework_recovers_from_suspended_ensemble() {
    let ensemble = MemoryEnsemble::new();
    let framework = connected_framework(&ensemble, &["recovery"]).await;
    let ops = framework.operations();
    ops.create("node").await.unwrap();
    ops.update("node", b"before").await.unwrap();

    ensemble.suspend();
    assert!(eventually(|| framework.session().is_none()).await);
    let e = ops.get("node").await.unwrap_err();
    assert!(e.is_framework_not_ready());

    ensemble.resume();
    assert!(framework.wait_connection(WAIT).await.unwrap().is_connected());
    assert_eq!(ops.get("node").await.unwrap(), b"before".to_vec());
    assert!(ensemble.connect_count() >= 2);
    assert_eq!(ensemble.live_sessions(), 1);

    framework.stop().await.unwrap();
    assert_eq!(framework.state(), ConnectionState::Disconnected);
    assert_eq!(ensemble.live_sessions(), 0);
}

#[tokio::test]
async fn test_framework_recovers_from_expired_session() {
    let ensemble = MemoryEnsemble::new();
    let framework = connected_framework(&ensemble, &["recovery"]).await;

    ensemble.expire_sessions();

    assert!(eventually(|| ensemble.connect_count() == 2 && framework.connected()).await);
    framework.operations().create("after-expiry").await.unwrap();
    assert_eq!(ensemble.node_data("/recovery/after-expiry"), Some(Vec::new()));

    framework.stop().await.unwrap();
}
