//! A synchronized cache follows remote writes.
//!
//! Scenario:
//!
//! 1. Two frameworks share an ensemble; one reads through a cache.
//! 2. The other framework rewrites the cached node.
//!
//! Expected Result:
//!
//! - The cache serves the new payload without an explicit refresh.
//! - Stopping the reading framework empties the cache.

use std::time::Duration;

use tokio::time::sleep;
use zk_framework::Cache;
use zk_framework::CacheOptions;
use zk_framework::EvictionPolicy;
use zk_framework::MemoryEnsemble;

use crate::common::connected_framework;

#[tokio::test]
async fn test_cache_follows_remote_writes() {
    let ensemble = MemoryEnsemble::new();
    let reader = connected_framework(&ensemble, &["shared"]).await;
    let writer = connected_framework(&ensemble, &["shared"]).await;
    writer.operations().create("settings").await.unwrap();
    writer.operations().update("settings", b"v1").await.unwrap();

    let cache = Cache::with_options(
        reader.clone(),
        CacheOptions {
            max_size_in_bytes: 1024,
            eviction_policy: EvictionPolicy::Lfu,
            enable_cache_synch: true,
        },
    )
    .unwrap();
    assert_eq!(cache.get("settings").await.unwrap(), b"v1".to_vec());

    writer.operations().update("settings", b"v2").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..250 {
        seen = cache.get("settings").await.unwrap();
        if seen == b"v2".to_vec() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(seen, b"v2".to_vec());
    assert_eq!(ensemble.read_count("/shared/settings"), 2);

    reader.stop().await.unwrap();
    assert!(cache.is_empty());
    writer.stop().await.unwrap();
}
