use sysinfo::System;
use tracing::warn;

use super::EvictionPolicy;
use crate::constants::CACHE_MAX_SIZE_PCTG_ENV;
use crate::constants::DEFAULT_CACHE_MEMORY_PERCENTAGE;
use crate::CacheConfig;
use crate::CacheError;
use crate::Result;

/// Settings of one [`Cache`](crate::Cache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Byte budget of the cached payloads, must be > 0
    pub max_size_in_bytes: i64,
    pub eviction_policy: EvictionPolicy,
    /// Keep entries fresh through data-changed watches
    pub enable_cache_synch: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size_in_bytes: default_max_size_in_bytes(None),
            eviction_policy: EvictionPolicy::default(),
            enable_cache_synch: true,
        }
    }
}

impl CacheOptions {
    /// Options with an explicit budget and default policy and sync
    pub fn with_max_size(max_size_in_bytes: i64) -> Self {
        Self {
            max_size_in_bytes,
            eviction_policy: EvictionPolicy::default(),
            enable_cache_synch: true,
        }
    }

    /// Applies the defaults to raw configuration: a missing budget becomes
    /// a share of total system memory.
    ///
    /// # Errors
    /// [`CacheError::InvalidEvictionPolicy`] for an unknown policy name.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let eviction_policy = config.eviction_policy.parse()?;
        let max_size_in_bytes = match config.max_size_in_bytes {
            Some(max_size_in_bytes) => max_size_in_bytes,
            None => default_max_size_in_bytes(config.max_size_pctg),
        };
        Ok(Self {
            max_size_in_bytes,
            eviction_policy,
            enable_cache_synch: config.enable_cache_synch,
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_size_in_bytes <= 0 {
            return Err(CacheError::InvalidCacheSize(self.max_size_in_bytes).into());
        }
        Ok(())
    }
}

/// `pctg` percent of total system memory. Without `pctg` the percentage is
/// read from `ZK_CACHE_MAX_SIZE_PCTG`, then defaults to 5.
pub fn default_max_size_in_bytes(pctg: Option<u8>) -> i64 {
    let pctg = pctg
        .or_else(memory_percentage_from_env)
        .unwrap_or(DEFAULT_CACHE_MEMORY_PERCENTAGE);

    let mut system = System::new();
    system.refresh_memory();
    let budget = u128::from(system.total_memory()) * u128::from(pctg) / 100;
    i64::try_from(budget).unwrap_or(i64::MAX)
}

fn memory_percentage_from_env() -> Option<u8> {
    let raw = std::env::var(CACHE_MAX_SIZE_PCTG_ENV).ok()?;
    match raw.trim().parse::<u8>() {
        Ok(pctg) if pctg <= 100 => Some(pctg),
        _ => {
            warn!(
                "invalid value for {}: {}, using default {}",
                CACHE_MAX_SIZE_PCTG_ENV, raw, DEFAULT_CACHE_MEMORY_PERCENTAGE
            );
            None
        }
    }
}
