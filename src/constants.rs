// -
// Paths

/// Separator of hierarchical node paths
pub const PATH_SEPARATOR: &str = "/";

// -
// Timeouts

/// Deadline applied to every CRUD-style remote call (milliseconds)
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Session timeout requested from the coordination service (milliseconds)
pub(crate) const DEFAULT_SESSION_TIMEOUT_MS: u64 = 10_000;

/// Reconnection backoff base interval (milliseconds)
pub(crate) const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 100;

/// Reconnection backoff ceiling (milliseconds)
pub(crate) const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

pub(crate) const DEFAULT_RECONNECT_JITTER_RATIO: f64 = 0.2;

// -
// Cache

/// Share of total system memory granted to a cache when no explicit budget is
/// configured (percent)
pub(crate) const DEFAULT_CACHE_MEMORY_PERCENTAGE: u8 = 5;

/// Environment override of [`DEFAULT_CACHE_MEMORY_PERCENTAGE`], 0..=100
pub const CACHE_MAX_SIZE_PCTG_ENV: &str = "ZK_CACHE_MAX_SIZE_PCTG";

// -
// Configuration

/// Prefix of environment variables overriding [`crate::FrameworkConfig`]
pub(crate) const CONFIG_ENV_PREFIX: &str = "ZKF";
