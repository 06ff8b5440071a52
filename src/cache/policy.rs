use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::IteratorRandom;

use super::CacheEntry;
use crate::CacheError;
use crate::Error;

/// Which entry makes room when a cache is over budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used
    Lfu,
    Random,
}

impl EvictionPolicy {
    /// Usage recorded for a freshly inserted entry. `tick` is the cache's
    /// logical clock at insertion.
    pub(crate) fn initial_usage(
        &self,
        tick: u64,
    ) -> u64 {
        match self {
            EvictionPolicy::Lru => tick,
            EvictionPolicy::Lfu => 1,
            EvictionPolicy::Random => 0,
        }
    }

    pub(crate) fn touch(
        &self,
        usage: &mut u64,
        tick: u64,
    ) {
        match self {
            EvictionPolicy::Lru => *usage = tick,
            EvictionPolicy::Lfu => *usage += 1,
            EvictionPolicy::Random => {}
        }
    }

    /// Key of the entry to evict; ties go to the first in iteration order.
    pub(crate) fn select_victim(
        &self,
        entries: &HashMap<String, CacheEntry>,
    ) -> Option<String> {
        match self {
            EvictionPolicy::Lru | EvictionPolicy::Lfu => entries
                .iter()
                .min_by_key(|(_, entry)| entry.usage)
                .map(|(key, _)| key.clone()),
            EvictionPolicy::Random => entries.keys().choose(&mut rand::thread_rng()).cloned(),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "random" => Ok(EvictionPolicy::Random),
            _ => Err(CacheError::InvalidEvictionPolicy(s.to_string()).into()),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Random => "random",
        };
        f.write_str(name)
    }
}
