//! Read-through cache of node payloads.
//!
//! Entries are fetched on first read and kept until evicted, cleared or the
//! framework stops. The total payload size is bounded by a byte budget: a miss
//! on a cache already over budget evicts exactly one entry, chosen by the
//! [`EvictionPolicy`], before fetching. A single entry larger than the budget
//! may therefore keep the cache over it.
//!
//! With synchronization enabled each entry owns a data-changed subscription;
//! every change refreshes the entry in the background.

mod options;
mod policy;
pub use options::*;
pub use policy::*;


use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::metrics::CACHE_EVICTIONS;
use crate::metrics::CACHE_HITS;
use crate::metrics::CACHE_MISSES;
use crate::metrics::CACHE_REFRESH_FAILURES;
use crate::EventType;
use crate::Framework;
use crate::Listener;
use crate::Result;
use crate::ShutdownListener;
use crate::WatchEvent;
use crate::WatchManager;

pub(crate) struct CacheEntry {
    /// Path as requested, relative to the framework namespace
    path: String,
    data: Vec<u8>,
    /// Last access tick (LRU) or access count (LFU)
    usage: u64,
}

#[derive(Default)]
struct CacheState {
    /// Keyed by absolute path
    entries: HashMap<String, CacheEntry>,
    size_in_bytes: usize,
}

impl CacheState {
    fn recompute_size(&mut self) {
        self.size_in_bytes = self.entries.values().map(|entry| entry.data.len()).sum();
    }
}

#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    id: String,
    framework: Framework,
    options: CacheOptions,
    watcher: WatchManager,
    state: RwLock<CacheState>,
    shutdown_listener: Arc<CacheShutdown>,
    // Logical clock ordering accesses for LRU
    tick: AtomicU64,
}

impl Cache {
    /// Cache configured from the framework's cache settings
    pub fn new(framework: Framework) -> Result<Self> {
        let options = CacheOptions::from_config(&framework.config().cache)?;
        Self::with_options(framework, options)
    }

    /// # Errors
    /// [`crate::CacheError::InvalidCacheSize`] when the budget is not positive.
    pub fn with_options(
        framework: Framework,
        options: CacheOptions,
    ) -> Result<Self> {
        options.validate()?;

        let id = format!("cache-{}", nanoid::nanoid!());
        let inner = Arc::new_cyclic(|cache| CacheInner {
            shutdown_listener: Arc::new(CacheShutdown {
                id: id.clone(),
                cache: cache.clone(),
            }),
            id,
            watcher: WatchManager::new(framework.clone()),
            framework,
            options,
            state: RwLock::new(CacheState::default()),
            tick: AtomicU64::new(0),
        });
        inner.attach()?;

        info!(
            "cache {} created: budget {} bytes, {} eviction, sync {}",
            inner.id,
            inner.options.max_size_in_bytes,
            inner.options.eviction_policy,
            inner.options.enable_cache_synch
        );
        Ok(Cache { inner })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Payload of `path`, served from memory when cached.
    ///
    /// # Errors
    /// Fetch failures on a miss, as returned by [`crate::Operations::get`].
    pub async fn get(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        let inner = &self.inner;
        let absolute = inner.framework.namespace().resolve(path);
        inner.attach()?;

        if let Some(data) = inner.hit(&absolute) {
            CACHE_HITS.inc();
            return Ok(data);
        }
        CACHE_MISSES.inc();
        debug!("cache {} miss on {}", inner.id, absolute);

        if let Some(victim) = inner.evict_one_if_over_budget() {
            inner.stop_sync(&victim);
        }

        let data = inner.framework.operations().get(path).await?;
        inner.insert(&absolute, path, data.clone());

        if inner.options.enable_cache_synch {
            inner.start_sync(path, &absolute).await;
        }
        Ok(data)
    }

    pub fn is_cached(
        &self,
        path: &str,
    ) -> bool {
        let absolute = self.inner.framework.namespace().resolve(path);
        self.inner.state.read().entries.contains_key(&absolute)
    }

    /// Sum of the cached payload lengths
    pub fn get_size_in_bytes(&self) -> usize {
        self.inner.state.read().size_in_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every entry and ends their subscriptions
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Clears the cache and detaches it from the framework. A later
    /// [`get`](Self::get) attaches it again.
    pub fn close(&self) {
        self.inner.clear();
        let listener = self.inner.shutdown_listener.as_ref();
        if let Err(e) = self.inner.framework.remove_shutdown_listener(listener) {
            debug!("cache {} shutdown listener: {}", self.inner.id, e);
        }
    }
}

impl CacheInner {
    /// Registers the shutdown listener unless already registered. A framework
    /// stop drops every registration, so this runs again after each restart.
    fn attach(&self) -> Result<()> {
        if self.framework.has_shutdown_listener(&self.id) {
            return Ok(());
        }
        match self.framework.add_shutdown_listener(self.shutdown_listener.clone()) {
            Ok(()) => {
                debug!("cache {} attached to framework shutdown", self.id);
                Ok(())
            }
            Err(e) if e.is_listener_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn hit(
        &self,
        absolute: &str,
    ) -> Option<Vec<u8>> {
        let tick = self.next_tick();
        let mut state = self.state.write();
        let entry = state.entries.get_mut(absolute)?;
        self.options.eviction_policy.touch(&mut entry.usage, tick);
        Some(entry.data.clone())
    }

    /// Evicts one entry when over budget and returns its relative path
    fn evict_one_if_over_budget(&self) -> Option<String> {
        let mut state = self.state.write();
        let budget = usize::try_from(self.options.max_size_in_bytes).unwrap_or(usize::MAX);
        if state.size_in_bytes <= budget {
            return None;
        }

        let policy = self.options.eviction_policy;
        let key = policy.select_victim(&state.entries)?;
        let victim = state.entries.remove(&key)?;
        state.recompute_size();

        CACHE_EVICTIONS.with_label_values(&[&policy.to_string()]).inc();
        info!(
            "cache {} evicted {} ({}), size now {} of {} bytes",
            self.id, key, policy, state.size_in_bytes, budget
        );
        Some(victim.path)
    }

    fn insert(
        &self,
        absolute: &str,
        path: &str,
        data: Vec<u8>,
    ) {
        let tick = self.next_tick();
        let mut state = self.state.write();
        state.entries.insert(
            absolute.to_string(),
            CacheEntry {
                path: path.to_string(),
                data,
                usage: self.options.eviction_policy.initial_usage(tick),
            },
        );
        state.recompute_size();
    }

    async fn start_sync(
        self: &Arc<Self>,
        path: &str,
        absolute: &str,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.watcher.set(path, tx, &[EventType::NodeDataChanged]).await {
            Ok(()) => {
                // Evicted while the watch was being armed: the evictor found
                // nothing to unset yet
                if !self.state.read().entries.contains_key(absolute) {
                    debug!("cache {} dropped watch of evicted {}", self.id, absolute);
                    self.unwatch(path);
                    return;
                }
                debug!("cache {} syncing {}", self.id, absolute);
                spawn_task(
                    "cache_refresh",
                    refresh_on_change(Arc::downgrade(self), path.to_string(), absolute.to_string(), rx),
                );
            }
            Err(e) if e.is_listener_already_exists() => {}
            Err(e) => warn!("cache {} could not watch {}: {}", self.id, absolute, e),
        }
    }

    fn stop_sync(
        &self,
        path: &str,
    ) {
        if self.options.enable_cache_synch {
            self.unwatch(path);
        }
    }

    fn unwatch(
        &self,
        path: &str,
    ) {
        if let Err(e) = self.watcher.unset(path, &[EventType::NodeDataChanged]) {
            debug!("cache {} unwatch {}: {}", self.id, path, e);
        }
    }

    /// Replaces the payload of a still cached entry
    fn refresh(
        &self,
        absolute: &str,
        data: Vec<u8>,
    ) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.entries.get_mut(absolute) else {
            return false;
        };
        entry.data = data;
        state.recompute_size();
        true
    }

    fn clear(&self) {
        let evicted: Vec<CacheEntry> = {
            let mut state = self.state.write();
            state.size_in_bytes = 0;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &evicted {
            self.stop_sync(&entry.path);
        }
        debug!("cache {} cleared {} entries", self.id, evicted.len());
    }
}

/// Refreshes one entry on every data change until its subscription ends
async fn refresh_on_change(
    cache: Weak<CacheInner>,
    path: String,
    absolute: String,
    mut changes: mpsc::UnboundedReceiver<WatchEvent>,
) -> Result<()> {
    while let Some(event) = changes.recv().await {
        let Some(inner) = cache.upgrade() else {
            break;
        };
        debug!("cache {} refreshing {} on {}", inner.id, absolute, event.event_type);

        match inner.framework.operations().get(&path).await {
            Ok(data) => {
                if !inner.refresh(&absolute, data) {
                    debug!("cache {} dropped refresh of evicted {}", inner.id, absolute);
                }
            }
            Err(e) => {
                CACHE_REFRESH_FAILURES.inc();
                warn!("cache {} kept stale {}: {}", inner.id, absolute, e);
            }
        }
    }
    Ok(())
}

/// Clears the cache when the framework stops
struct CacheShutdown {
    id: String,
    cache: Weak<CacheInner>,
}

impl Listener for CacheShutdown {
    fn id(&self) -> &str {
        &self.id
    }
}

impl ShutdownListener for CacheShutdown {
    fn on_shutdown(&self) -> Result<()> {
        if let Some(cache) = self.cache.upgrade() {
            info!("framework stopped, clearing cache {}", self.id);
            cache.clear();
        }
        Ok(())
    }
}
