use config::ConfigError;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// Raw cache settings as read from configuration sources.
///
/// Turned into [`crate::CacheOptions`] by
/// [`CacheOptions::from_config`](crate::CacheOptions::from_config), which is
/// where defaults derived from the host are applied.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Explicit byte budget; derived from system memory when unset
    #[serde(default)]
    pub max_size_in_bytes: Option<i64>,

    /// Share of total system memory used when no explicit budget is set.
    /// Falls back to `ZK_CACHE_MAX_SIZE_PCTG`, then to 5.
    #[serde(default)]
    pub max_size_pctg: Option<u8>,

    /// One of `lru`, `lfu`, `random`
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// Keep entries fresh through data-changed watches
    #[serde(default = "default_enable_cache_synch")]
    pub enable_cache_synch: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_in_bytes: None,
            max_size_pctg: None,
            eviction_policy: default_eviction_policy(),
            enable_cache_synch: default_enable_cache_synch(),
        }
    }
}

impl CacheConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(pctg) = self.max_size_pctg {
            if pctg > 100 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "cache memory percentage {pctg} must be within 0..=100"
                ))));
            }
        }
        Ok(())
    }
}

fn default_eviction_policy() -> String {
    "lru".to_string()
}
fn default_enable_cache_synch() -> bool {
    true
}
