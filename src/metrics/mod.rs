//! Prometheus metrics of the framework.
//!
//! Collectors are process wide. [`REGISTRY`] holds all of them; callers with
//! their own registry use [`register_custom_metrics`].


use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

lazy_static! {
    pub static ref CACHE_HITS: IntCounter =
        IntCounter::new("cache_hits", "Cache reads served from memory")
            .expect("metric can not be created");

    pub static ref CACHE_MISSES: IntCounter =
        IntCounter::new("cache_misses", "Cache reads fetched from the service")
            .expect("metric can not be created");

    pub static ref CACHE_EVICTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_evictions", "Entries evicted from caches"),
        &["policy"]
    )
    .expect("metric can not be created");

    pub static ref CACHE_REFRESH_FAILURES: IntCounter = IntCounter::new(
        "cache_refresh_failures",
        "Watch driven cache refreshes that failed and kept the stale value"
    )
    .expect("metric can not be created");

    pub static ref RECONNECT_ATTEMPTS: IntCounter =
        IntCounter::new("reconnect_attempts", "Session reconnection attempts")
            .expect("metric can not be created");

    pub static ref STATE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("state_transitions", "Applied connection state transitions"),
        &["state"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_REARMS: IntCounter =
        IntCounter::new("watch_rearms", "Continuous watches re-armed after a session loss")
            .expect("metric can not be created");

    pub static ref OPERATION_LATENCY_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("operation_latency_ms", "Latency of CRUD operations in ms")
            .buckets(exponential_buckets(0.5, 2.0, 16).expect("buckets can be created")),
        &["operation"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        if let Err(e) = register_custom_metrics(&registry) {
            warn!("could not register framework metrics: {}", e);
        }
        registry
    };
}

pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(CACHE_HITS.clone()))?;
    registry.register(Box::new(CACHE_MISSES.clone()))?;
    registry.register(Box::new(CACHE_EVICTIONS.clone()))?;
    registry.register(Box::new(CACHE_REFRESH_FAILURES.clone()))?;
    registry.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
    registry.register(Box::new(STATE_TRANSITIONS.clone()))?;
    registry.register(Box::new(WATCH_REARMS.clone()))?;
    registry.register(Box::new(OPERATION_LATENCY_MS.clone()))?;
    Ok(())
}

/// Every framework metric in the Prometheus text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode framework metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("framework metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
