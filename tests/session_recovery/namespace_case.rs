use std::sync::Arc;

use zk_framework::create_framework;
use zk_framework::MemoryEnsemble;

use crate::common::connected_framework;

#[tokio::test]
async fn test_messy_namespace_segments_are_joined() {
    let ensemble = MemoryEnsemble::new();
    let framework = create_framework("memory://integration", Arc::new(ensemble), ["", "a/", "/b", "c"]).unwrap();
    assert_eq!(framework.namespace().as_str(), "/a/b/c");
}

#[tokio::test]
async fn test_operations_stay_inside_namespace() {
    let ensemble = MemoryEnsemble::new();
    let tenant_a = connected_framework(&ensemble, &["tenants", "a"]).await;
    let tenant_b = connected_framework(&ensemble, &["tenants", "b"]).await;

    tenant_a.operations().create("config").await.unwrap();
    tenant_a.operations().update("config", b"a").await.unwrap();
    tenant_b.operations().create("config").await.unwrap();

    assert_eq!(ensemble.node_data("/tenants/a/config"), Some(b"a".to_vec()));
    assert_eq!(ensemble.node_data("/tenants/b/config"), Some(Vec::new()));
    assert_eq!(tenant_a.operations().ls("").await.unwrap(), vec!["config".to_string()]);

    tenant_a.stop().await.unwrap();
    tenant_b.stop().await.unwrap();
}
