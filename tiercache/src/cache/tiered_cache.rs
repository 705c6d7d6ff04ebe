//! Tiered cache facade
//!
//! `TieredCache` is the public entry point. It owns the in-memory tiers
//! (through the [`TierManager`]), the statistics collector and the event
//! log, and shares a storage backend it never creates or destroys.
//!
//! All tier state sits behind one `tokio::sync::Mutex`. Facade operations
//! hold it across the single backend call they make, so the durable write of
//! a `set` always happens before its volatile write. Counters and events use
//! `parking_lot` locks that are never held across an `.await`.

use super::stats::{CacheStatistics, StatsCollector};
use super::sync::{self, SyncReport};
use super::tier_manager::{Lookup, TierChange, TierManager};
use crate::config::CacheConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::error::{CacheError, Result};
use crate::core::types::{CacheEntry, CacheValue, EntryStatus, SetOptions, Tier};
use crate::metrics;
use crate::monitoring::{CacheEvent, EventKind, EventLog};
use crate::storage::{InMemoryStorage, StorageBackend};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `destroy` waits for the sync task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Outcome of one `maintenance` pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceReport {
    /// Expired copies purged from either tier
    pub expired: usize,
    /// Tag-index keys that no longer existed
    pub tags_pruned: usize,
    /// `None` when syncing is disabled
    pub sync: Option<SyncReport>,
    pub total_entries: usize,
}

/// Shared state behind every clone of a `TieredCache`
pub(crate) struct CacheInner<V> {
    pub(crate) config: CacheConfig,
    pub(crate) state: Mutex<TierManager<V>>,
    pub(crate) stats: parking_lot::Mutex<StatsCollector>,
    pub(crate) events: EventLog,
    pub(crate) backend: Arc<dyn StorageBackend<V>>,
    pub(crate) clock: Arc<dyn Clock>,
    sync_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    destroyed: AtomicBool,
}

impl<V: CacheValue> CacheInner<V> {
    /// Record an event when metrics are enabled
    pub(crate) fn event(
        &self,
        kind: EventKind,
        tier: Option<Tier>,
        key: Option<&str>,
        payload: Option<serde_json::Value>,
    ) {
        if self.config.metrics.enabled {
            self.events
                .record(kind, tier, key, self.clock.now(), payload);
        }
    }

    /// Count and log a backend failure. Never propagates.
    pub(crate) fn backend_failed(&self, operation: &str, key: Option<&str>, error: &CacheError) {
        warn!(
            "Storage backend '{}' failed during {} (key={:?}): {}",
            self.backend.name(),
            operation,
            key,
            error
        );
        self.stats.lock().record_sync_error();
        self.event(
            EventKind::Error,
            Some(Tier::Durable),
            key,
            Some(json!({ "operation": operation, "error": error.to_string() })),
        );
        if self.config.metrics.enabled {
            metrics::record_sync("error", 1);
        }
    }

    /// Fold the tier manager's change journal into counters and events,
    /// then refresh the size gauges
    pub(crate) fn settle(&self, state: &mut TierManager<V>) {
        let changes = state.drain_changes();
        let sizes = state.sizes();
        let now = self.clock.now();
        let metrics_enabled = self.config.metrics.enabled;

        let mut stats = self.stats.lock();
        for change in changes {
            match change {
                TierChange::Evicted { key, tier, demoted } => {
                    stats.record_eviction(tier);
                    if demoted {
                        stats.record_demotion();
                    }
                    self.event(
                        EventKind::Evict,
                        Some(tier),
                        Some(&key),
                        Some(json!({ "demoted": demoted })),
                    );
                    if metrics_enabled {
                        metrics::record_eviction(tier.as_str());
                        if demoted {
                            metrics::record_tier_move("demote");
                        }
                    }
                }
                TierChange::Promoted { .. } => {
                    stats.record_promotion();
                    if metrics_enabled {
                        metrics::record_tier_move("promote");
                    }
                }
                TierChange::Expired { key, tier } => {
                    debug!("Expired {} in {} tier", key, tier.as_str());
                }
            }
        }
        stats.refresh(sizes, now);

        if metrics_enabled {
            metrics::update_tier_sizes(&sizes);
        }
    }

    fn observe(&self, operation: &str, result: &str, started: Instant) {
        if self.config.metrics.enabled {
            metrics::record_cache_op(operation, result, started.elapsed().as_secs_f64());
        }
    }
}

/// Two-tier cache: a bounded volatile tier in front of a durable tier
/// persisted through a [`StorageBackend`].
///
/// Cloning is cheap and every clone operates on the same cache.
pub struct TieredCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for TieredCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: CacheValue> TieredCache<V> {
    /// Create a cache over `backend`, reading time from `clock`
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn StorageBackend<V>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "Tiered cache initialized: volatile={} entries/{} bytes ({:?}), durable={} ({}), backend={}",
            config.volatile.max_entries,
            config.volatile.max_bytes,
            config.volatile.eviction_strategy,
            if config.durable.enabled { "enabled" } else { "disabled" },
            config.durable.max_entries,
            backend.name()
        );

        let (shutdown, _) = watch::channel(false);
        let inner = CacheInner {
            state: Mutex::new(TierManager::from_config(&config)),
            stats: parking_lot::Mutex::new(StatsCollector::new()),
            events: EventLog::new(config.metrics.max_events),
            backend,
            clock,
            sync_task: parking_lot::Mutex::new(None),
            shutdown,
            destroyed: AtomicBool::new(false),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Create a cache over `backend` using wall-clock time
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn StorageBackend<V>>) -> Result<Self> {
        Self::new(config, backend, Arc::new(SystemClock))
    }

    /// Create a cache whose durable tier lives in process memory
    pub fn in_memory(config: CacheConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(InMemoryStorage::<V>::new()))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn durable_enabled(&self) -> bool {
        self.inner.config.durable.enabled
    }

    /// Get a value, volatile tier first. Missing and expired keys are `None`.
    pub async fn get(&self, key: &str) -> Option<V> {
        let started = Instant::now();
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut state = inner.state.lock().await;

        let mut found = state
            .read_volatile(key, now)
            .into_hit()
            .map(|value| (value, Tier::Volatile));
        let mut missed = Vec::with_capacity(2);

        if found.is_none() {
            missed.push(Tier::Volatile);
            if self.durable_enabled() {
                found = match state.read_durable(key, now) {
                    Lookup::Hit(value) => Some((value, Tier::Durable)),
                    Lookup::Expired => None,
                    Lookup::Absent => self
                        .read_through(&mut state, key)
                        .await
                        .map(|value| (value, Tier::Durable)),
                };
                if found.is_none() {
                    missed.push(Tier::Durable);
                }
            }
        }

        inner.settle(&mut state);
        drop(state);

        if !missed.is_empty() {
            let mut stats = inner.stats.lock();
            for tier in missed {
                stats.record_tier_miss(tier);
            }
        }

        let elapsed = started.elapsed();
        match found {
            Some((value, tier)) => {
                debug!("GET {} hit in {} tier", key, tier.as_str());
                inner.stats.lock().record_hit(tier, elapsed);
                inner.event(EventKind::Hit, Some(tier), Some(key), None);
                inner.observe("get", "hit", started);
                Some(value)
            }
            None => {
                debug!("GET {} miss", key);
                inner.stats.lock().record_miss(elapsed);
                inner.event(EventKind::Miss, None, Some(key), None);
                inner.observe("get", "miss", started);
                None
            }
        }
    }

    /// Fetch a live copy of `key` from the backend. Keys the backend lacks,
    /// expired copies and keys awaiting a backend delete are `NotFound`.
    async fn load_live(&self, state: &mut TierManager<V>, key: &str) -> Result<CacheEntry<V>> {
        let inner = &self.inner;
        let not_found = || CacheError::NotFound(key.to_string());
        if !self.durable_enabled() || !inner.config.sync.on_read || state.is_pending_delete(key) {
            return Err(not_found());
        }

        let loaded = inner.backend.load(key).await?.ok_or_else(not_found)?;
        if loaded.key != key {
            warn!("Backend returned entry {} for key {}", loaded.key, key);
            return Err(not_found());
        }
        if loaded.is_expired(inner.clock.now()) {
            state.queue_delete(key);
            return Err(not_found());
        }
        Ok(loaded)
    }

    /// Load `key` from the backend into the durable tier and read it there
    async fn read_through(&self, state: &mut TierManager<V>, key: &str) -> Option<V> {
        let inner = &self.inner;
        match self.load_live(state, key).await {
            Ok(loaded) => {
                debug!("Read-through loaded {} from '{}'", key, inner.backend.name());
                state.adopt_loaded(loaded);
                state.read_durable(key, inner.clock.now()).into_hit()
            }
            Err(CacheError::NotFound(_)) => None,
            Err(e) => {
                inner.backend_failed("load", Some(key), &e);
                None
            }
        }
    }

    /// Store a value.
    ///
    /// Only TTL, serialization and sizing problems are returned; backend
    /// failures leave the durable copy dirty for the next sync tick.
    pub async fn set(&self, key: &str, value: V, options: SetOptions) -> Result<()> {
        let started = Instant::now();
        let inner = &self.inner;
        let config = &inner.config;

        let durable_enabled = self.durable_enabled();
        if options.durable_only && !durable_enabled {
            warn!(
                "durable_only write of {} with the durable tier disabled; storing in volatile tier",
                key
            );
        }
        let durable_only = options.durable_only && durable_enabled;

        let ttl = options.ttl.unwrap_or_else(|| {
            if durable_only {
                config.durable_ttl()
            } else {
                config.volatile_ttl()
            }
        });
        let tags: BTreeSet<String> = options.tags.into_iter().collect();
        let tier = if durable_only {
            Tier::Durable
        } else {
            Tier::Volatile
        };

        let now = inner.clock.now();
        let entry = CacheEntry::new(key, value, tier, now, ttl, tags, options.metadata)?;
        let size_bytes = entry.size_bytes;

        let mut state = inner.state.lock().await;
        state.cancel_delete(key);

        let mut status = EntryStatus::Fresh;
        if durable_enabled {
            let mut durable = entry.copy_to(Tier::Durable);
            let mut dirty = true;
            if config.sync.on_write {
                match inner.backend.save(&durable).await {
                    Ok(()) => dirty = false,
                    Err(e) => inner.backend_failed("save", Some(key), &e),
                }
            }
            if dirty {
                status = EntryStatus::Stale;
            }
            durable.status = status;
            state.insert_durable(durable, dirty);
        }

        if durable_only {
            state.remove_volatile(key);
        } else {
            let mut volatile = entry;
            volatile.status = status;
            state.insert_volatile(volatile);
        }

        inner.settle(&mut state);
        drop(state);

        debug!("SET {} size={} ttl={:?} tier={}", key, size_bytes, ttl, tier.as_str());
        inner.event(
            EventKind::Set,
            Some(tier),
            Some(key),
            Some(json!({ "size_bytes": size_bytes, "ttl_ms": ttl.as_millis() as u64 })),
        );
        inner.observe("set", "ok", started);
        Ok(())
    }

    /// Remove `key` from both tiers, the tag index and the backend.
    /// Returns `(had_copy, backend_deleted)`.
    async fn remove_key(&self, state: &mut TierManager<V>, key: &str) -> (bool, bool) {
        let inner = &self.inner;
        let existed = state.remove(key);

        let mut backend_deleted = true;
        if self.durable_enabled() {
            match inner.backend.delete(key).await {
                Ok(()) => state.cancel_delete(key),
                Err(e) => {
                    state.queue_delete(key);
                    inner.backend_failed("delete", Some(key), &e);
                    backend_deleted = false;
                }
            }
        }

        inner.event(EventKind::Delete, None, Some(key), None);
        (existed, backend_deleted)
    }

    /// Delete a key; returns whether an in-memory copy existed
    pub async fn delete(&self, key: &str) -> bool {
        let started = Instant::now();
        let mut state = self.inner.state.lock().await;
        let (existed, _) = self.remove_key(&mut state, key).await;
        self.inner.settle(&mut state);
        drop(state);

        debug!("DELETE {} existed={}", key, existed);
        self.inner
            .observe("delete", if existed { "ok" } else { "absent" }, started);
        existed
    }

    /// Whether `get` would find a live copy. Does not count as an access.
    pub async fn has(&self, key: &str) -> bool {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut state = inner.state.lock().await;
        let mut exists = state.peek(key, now);

        if !exists {
            // Same backend view as a read-through, without adopting the copy
            exists = match self.load_live(&mut state, key).await {
                Ok(_) => true,
                Err(CacheError::NotFound(_)) => false,
                Err(e) => {
                    inner.backend_failed("load", Some(key), &e);
                    false
                }
            };
        }

        inner.settle(&mut state);
        exists
    }

    /// Empty both tiers, the tag index, pending work and the event log
    pub async fn clear(&self) {
        let started = Instant::now();
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let removed = state.clear();
        inner.events.reset();

        if self.durable_enabled() {
            if let Err(e) = inner.backend.clear().await {
                warn!("Storage backend '{}' failed to clear: {}", inner.backend.name(), e);
                inner.stats.lock().record_sync_error();
            }
        }

        inner.settle(&mut state);
        drop(state);

        info!("Cache cleared ({} keys)", removed);
        inner.observe("clear", "ok", started);
    }

    async fn invalidate_keys(&self, state: &mut TierManager<V>, keys: Vec<String>) -> usize {
        let mut removed = 0;
        for key in keys {
            let (_, backend_deleted) = self.remove_key(state, &key).await;
            if backend_deleted {
                removed += 1;
            }
        }
        removed
    }

    /// Delete every key carrying `tag`; returns how many were fully removed
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let started = Instant::now();
        let mut state = self.inner.state.lock().await;
        let keys = state.keys_for_tag(tag);
        let candidates = keys.len();
        let removed = self.invalidate_keys(&mut state, keys).await;
        self.inner.settle(&mut state);
        drop(state);

        info!("Invalidated {}/{} keys tagged '{}'", removed, candidates, tag);
        self.inner.observe("invalidate_tag", "ok", started);
        removed
    }

    /// Delete every known key matching the regular expression `pattern`
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let started = Instant::now();
        let regex = Regex::new(pattern).map_err(|e| CacheError::InvalidPattern(e.to_string()))?;

        let mut state = self.inner.state.lock().await;
        let keys: Vec<String> = state
            .known_keys()
            .into_iter()
            .filter(|key| regex.is_match(key))
            .collect();
        let candidates = keys.len();
        let removed = self.invalidate_keys(&mut state, keys).await;
        self.inner.settle(&mut state);
        drop(state);

        info!(
            "Invalidated {}/{} keys matching '{}'",
            removed, candidates, pattern
        );
        self.inner.observe("invalidate_pattern", "ok", started);
        Ok(removed)
    }

    /// Point-in-time statistics
    pub async fn get_statistics(&self) -> CacheStatistics {
        let sizes = self.inner.state.lock().await.sizes();
        let mut stats = self.inner.stats.lock();
        stats.refresh(sizes, self.inner.clock.now());
        stats.snapshot()
    }

    /// Most recent events first
    pub fn get_events(&self, limit: usize) -> Vec<CacheEvent> {
        self.inner.events.recent(limit)
    }

    /// Run one sync tick immediately
    pub async fn sync_now(&self) -> SyncReport {
        sync::sync_once(&self.inner).await
    }

    /// Purge expired entries, sync dirty copies, prune the tag index and
    /// enforce durable capacity
    pub async fn maintenance(&self) -> MaintenanceReport {
        let started = Instant::now();
        let inner = &self.inner;
        let now = inner.clock.now();

        let expired = {
            let mut state = inner.state.lock().await;
            let expired = state.purge_expired(now);
            state.enforce_durable_capacity(None);
            inner.settle(&mut state);
            expired
        };

        let sync = if self.durable_enabled() && inner.config.sync.enabled {
            Some(sync::sync_once(inner).await)
        } else {
            None
        };

        let (tags_pruned, total_entries) = {
            let mut state = inner.state.lock().await;
            let pruned = state.prune_tags();
            inner.settle(&mut state);
            (pruned, state.sizes().distinct_entries)
        };

        debug!(
            "Maintenance: expired={} tags_pruned={} total_entries={}",
            expired, tags_pruned, total_entries
        );
        inner.observe("maintenance", "ok", started);

        MaintenanceReport {
            expired,
            tags_pruned,
            sync,
            total_entries,
        }
    }

    /// Start the periodic sync task on the current tokio runtime.
    ///
    /// Returns `false` when periodic sync is disabled, a task is already
    /// running, no runtime is available, or the cache was destroyed.
    pub fn start_sync_task(&self) -> bool {
        let inner = &self.inner;
        if inner.destroyed.load(Ordering::SeqCst) || !inner.config.periodic_sync_enabled() {
            return false;
        }
        let Some(period) = inner.config.sync_interval() else {
            return false;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available; periodic sync not started");
            return false;
        };

        let mut slot = inner.sync_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let cache = Arc::downgrade(&self.inner);
        let shutdown = inner.shutdown.subscribe();
        *slot = Some(runtime.spawn(sync::run_periodic(cache, period, shutdown)));

        info!("Starting sync task (interval={}ms)", period.as_millis());
        true
    }

    pub fn is_sync_running(&self) -> bool {
        self.inner
            .sync_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the sync task, flush dirty durable copies and drop all
    /// in-memory state. The backend's data is left in place.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = inner.shutdown.send(true);
        let task = inner.sync_task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Sync task did not stop in time; aborting");
                task.abort();
            }
        }

        if self.durable_enabled() && inner.config.sync.enabled {
            let report = sync::sync_once(inner).await;
            if report.errors > 0 {
                warn!("Final flush left {} entries unsynced", report.errors);
            }
        }

        let mut state = inner.state.lock().await;
        state.clear();
        inner.events.reset();
        inner.settle(&mut state);

        info!("Tiered cache destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}
