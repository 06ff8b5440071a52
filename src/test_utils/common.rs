use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::Framework;
use crate::MemoryEnsemble;
use crate::ReconnectPolicy;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Reconnects within tens of milliseconds, without jitter
pub fn fast_reconnect_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay_ms: 10,
        max_delay_ms: 100,
        jitter_ratio: 0.0,
    }
}

pub fn test_framework(
    ensemble: &MemoryEnsemble,
    namespace: &[&str],
) -> Framework {
    Framework::builder("memory://test", Arc::new(ensemble.clone()))
        .namespace(namespace.iter().copied())
        .reconnect_policy(fast_reconnect_policy())
        .build()
        .expect("test framework should build")
}

/// A framework already connected to `ensemble`
pub async fn started_framework(
    ensemble: &MemoryEnsemble,
    namespace: &[&str],
) -> Framework {
    enable_logger();
    let framework = test_framework(ensemble, namespace);
    framework.start().await.expect("start should succeed");
    let outcome = framework
        .wait_connection(Duration::from_secs(5))
        .await
        .expect("should connect");
    assert!(outcome.is_connected());
    framework
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(
    condition: F,
    timeout: Duration,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
