use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use zk_framework::Framework;
use zk_framework::MemoryEnsemble;
use zk_framework::ReconnectPolicy;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

pub const WAIT: Duration = Duration::from_secs(5);

/// A connected framework rooted at `namespace` on `ensemble`
pub async fn connected_framework(
    ensemble: &MemoryEnsemble,
    namespace: &[&str],
) -> Framework {
    enable_logger();
    let framework = Framework::builder("memory://integration", Arc::new(ensemble.clone()))
        .namespace(namespace.iter().copied())
        .reconnect_policy(ReconnectPolicy {
            base_delay_ms: 10,
            max_delay_ms: 200,
            jitter_ratio: 0.1,
        })
        .build()
        .expect("framework should build");
    framework.start().await.expect("start should succeed");
    let outcome = framework.wait_connection(WAIT).await.expect("should connect");
    assert!(outcome.is_connected());
    framework
}

pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
