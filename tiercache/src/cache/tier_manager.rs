//! Tier Manager
//!
//! Owns the volatile map, the durable map and the tag index, and is the only
//! place they are mutated. Nothing here performs I/O: operations that need
//! the storage backend are split so the caller does the I/O and reports the
//! outcome back (`mark_persisted`, `confirm_delete`, `adopt_loaded`).
//!
//! Per-key transitions:
//!
//! ```text
//! Absent ──set──────────────▶ Volatile (+ durable copy when enabled)
//! Absent ──set durable_only─▶ Durable
//! Durable ──promotion───────▶ Volatile (durable copy retained)
//! Volatile ──eviction───────▶ Durable (demoted) or Absent
//! any ──delete/expiry/clear─▶ Absent
//! ```

use super::eviction::{Candidate, EvictionPolicy, EvictionStrategy};
use super::stats::TierSizes;
use super::tag_index::TagIndex;
use crate::config::{CacheConfig, ConflictResolution};
use crate::core::types::{CacheEntry, EntryStatus, Tier};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Something the tier manager did on its own while serving a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierChange {
    Evicted {
        key: String,
        tier: Tier,
        demoted: bool,
    },
    Promoted {
        key: String,
    },
    Expired {
        key: String,
        tier: Tier,
    },
}

/// Result of a single-tier lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    /// A copy existed but had expired; it has been purged
    Expired,
    Absent,
}

impl<V> Lookup<V> {
    pub fn into_hit(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Volatile entries that had no durable counterpart
    pub copied: usize,
    /// Version mismatches settled by the conflict policy
    pub conflicts: usize,
}

/// Capacity and threshold settings
#[derive(Debug, Clone)]
pub struct TierLimits {
    pub volatile_max_entries: usize,
    pub volatile_max_bytes: u64,
    pub durable_enabled: bool,
    pub durable_max_entries: usize,
    pub durable_max_bytes: u64,
    pub promote_min_access: u64,
    pub promote_window: chrono::Duration,
    pub demote_min_access: u64,
}

impl TierLimits {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            volatile_max_entries: config.volatile.max_entries,
            volatile_max_bytes: config.volatile.max_bytes,
            durable_enabled: config.durable.enabled,
            durable_max_entries: config.durable.max_entries,
            durable_max_bytes: config.durable.max_bytes,
            promote_min_access: config.promotion.min_access_count,
            promote_window: chrono::Duration::from_std(config.promotion_window())
                .unwrap_or(chrono::Duration::MAX),
            demote_min_access: config.demotion.min_access_count,
        }
    }

    /// `access_count` already includes the current read; `previous_access`
    /// is the access before it
    fn should_promote(
        &self,
        access_count: u64,
        previous_access: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        access_count >= self.promote_min_access || now - previous_access < self.promote_window
    }
}

pub struct TierManager<V> {
    volatile: HashMap<String, CacheEntry<V>>,
    durable: HashMap<String, CacheEntry<V>>,
    volatile_bytes: u64,
    durable_bytes: u64,
    tags: TagIndex,
    /// Durable copies the backend does not hold yet
    dirty: HashSet<String>,
    /// Keys whose backend copy still has to be deleted
    pending_deletes: BTreeSet<String>,
    /// Snapshotted keys whose save outcome has not been reported yet
    in_flight: HashMap<String, usize>,
    /// In-flight keys removed from memory while their save was running
    revoked: HashSet<String>,
    policy: Box<dyn EvictionPolicy>,
    limits: TierLimits,
    changes: Vec<TierChange>,
}

impl<V: Clone> TierManager<V> {
    pub fn new(limits: TierLimits, strategy: EvictionStrategy) -> Self {
        Self {
            volatile: HashMap::new(),
            durable: HashMap::new(),
            volatile_bytes: 0,
            durable_bytes: 0,
            tags: TagIndex::new(),
            dirty: HashSet::new(),
            pending_deletes: BTreeSet::new(),
            in_flight: HashMap::new(),
            revoked: HashSet::new(),
            policy: strategy.policy(),
            limits,
            changes: Vec::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            TierLimits::from_config(config),
            config.volatile.eviction_strategy,
        )
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.policy.strategy()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Volatile lookup; a hit counts as an access
    pub fn read_volatile(&mut self, key: &str, now: DateTime<Utc>) -> Lookup<V> {
        match self.volatile.get_mut(key) {
            None => return Lookup::Absent,
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                return Lookup::Hit(entry.value.clone());
            }
            Some(_) => {}
        }
        self.expire_copy(key, Tier::Volatile);
        Lookup::Expired
    }

    /// Durable lookup; a hit counts as an access and may promote the entry
    pub fn read_durable(&mut self, key: &str, now: DateTime<Utc>) -> Lookup<V> {
        let promote = match self.durable.get_mut(key) {
            None => return Lookup::Absent,
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => {
                let previous = entry.last_accessed_at;
                entry.touch(now);
                Some(self.limits.should_promote(entry.access_count, previous, now))
            }
        };

        let Some(promote) = promote else {
            self.expire_copy(key, Tier::Durable);
            return Lookup::Expired;
        };

        let Some(entry) = self.durable.get(key) else {
            return Lookup::Absent;
        };
        let value = entry.value.clone();
        if promote {
            let copy = entry.copy_to(Tier::Volatile);
            self.insert_volatile(copy);
            self.changes.push(TierChange::Promoted {
                key: key.to_string(),
            });
            debug!("Promoted {} to volatile tier", key);
        }
        Lookup::Hit(value)
    }

    /// Existence check that purges expired copies but records no access
    pub fn peek(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        for tier in [Tier::Volatile, Tier::Durable] {
            let expired = match self.map(tier).get(key) {
                None => continue,
                Some(entry) => entry.is_expired(now),
            };
            if !expired {
                return true;
            }
            self.expire_copy(key, tier);
        }
        false
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert or replace the volatile copy, then enforce capacity
    pub fn insert_volatile(&mut self, mut entry: CacheEntry<V>) {
        entry.tier = Tier::Volatile;
        let key = entry.key.clone();

        self.tags.set_tags(&key, &entry.tags);
        self.volatile_bytes += entry.size_bytes;
        if let Some(old) = self.volatile.insert(key.clone(), entry) {
            self.volatile_bytes = self.volatile_bytes.saturating_sub(old.size_bytes);
        }

        self.enforce_volatile_capacity(Some(&key));
    }

    /// Insert or replace the durable copy, then enforce durable capacity.
    /// `dirty` marks a copy the backend does not hold yet.
    pub fn insert_durable(&mut self, mut entry: CacheEntry<V>, dirty: bool) {
        entry.tier = Tier::Durable;
        let key = entry.key.clone();

        self.tags.set_tags(&key, &entry.tags);
        self.durable_bytes += entry.size_bytes;
        if let Some(old) = self.durable.insert(key.clone(), entry) {
            self.durable_bytes = self.durable_bytes.saturating_sub(old.size_bytes);
        }
        if dirty {
            self.dirty.insert(key.clone());
        } else {
            self.dirty.remove(&key);
        }
        self.revoked.remove(&key);

        self.enforce_durable_capacity(Some(&key));
    }

    /// Drop only the volatile copy
    pub fn remove_volatile(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.volatile.remove(key)?;
        self.volatile_bytes = self.volatile_bytes.saturating_sub(entry.size_bytes);
        if !self.durable.contains_key(key) {
            self.tags.remove_key(key);
        }
        Some(entry)
    }

    /// Drop only the durable copy
    pub fn remove_durable(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.durable.remove(key)?;
        self.durable_bytes = self.durable_bytes.saturating_sub(entry.size_bytes);
        self.dirty.remove(key);
        if !self.volatile.contains_key(key) {
            self.tags.remove_key(key);
        }
        Some(entry)
    }

    /// Remove the key from both tiers. Returns whether any copy existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let volatile = self.remove_volatile(key).is_some();
        let durable = self.remove_durable(key).is_some();
        self.tags.remove_key(key);
        if self.in_flight.contains_key(key) {
            self.revoked.insert(key.to_string());
        }
        volatile || durable
    }

    /// Adopt an entry read through from the backend as a clean durable copy
    pub fn adopt_loaded(&mut self, mut entry: CacheEntry<V>) {
        entry.status = EntryStatus::Fresh;
        self.insert_durable(entry, false);
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.sizes().distinct_entries;
        self.volatile.clear();
        self.durable.clear();
        self.volatile_bytes = 0;
        self.durable_bytes = 0;
        self.tags.clear();
        self.dirty.clear();
        self.pending_deletes.clear();
        self.changes.clear();
        // Saves still running would write the old copies back
        self.revoked.extend(self.in_flight.keys().cloned());
        removed
    }

    // ------------------------------------------------------------------
    // Capacity, eviction, demotion
    // ------------------------------------------------------------------

    fn volatile_over_capacity(&self) -> bool {
        self.volatile.len() > self.limits.volatile_max_entries
            || self.volatile_bytes > self.limits.volatile_max_bytes
    }

    fn durable_over_capacity(&self) -> bool {
        self.durable.len() > self.limits.durable_max_entries
            || self.durable_bytes > self.limits.durable_max_bytes
    }

    /// Evict until both volatile bounds hold. `protect` (the key just
    /// written) is only chosen when it is the last entry left.
    pub fn enforce_volatile_capacity(&mut self, protect: Option<&str>) {
        while self.volatile_over_capacity() {
            let victim = {
                let only_one = self.volatile.len() == 1;
                let mut candidates = self
                    .volatile
                    .values()
                    .filter(|e| only_one || Some(e.key.as_str()) != protect)
                    .map(Candidate::from);
                self.policy
                    .select_victim(&mut candidates)
                    .map(str::to_string)
            };
            let Some(victim) = victim else {
                break;
            };
            self.evict_volatile(&victim);
        }
    }

    fn evict_volatile(&mut self, key: &str) {
        let Some(entry) = self.volatile.remove(key) else {
            return;
        };
        self.volatile_bytes = self.volatile_bytes.saturating_sub(entry.size_bytes);

        let demoted =
            self.limits.durable_enabled && entry.access_count > self.limits.demote_min_access;
        if demoted {
            self.demote(entry);
        } else if !self.durable.contains_key(key) {
            self.tags.remove_key(key);
        }

        debug!("Evicted {} from volatile tier (demoted={})", key, demoted);
        self.changes.push(TierChange::Evicted {
            key: key.to_string(),
            tier: Tier::Volatile,
            demoted,
        });
    }

    /// Move a volatile entry into the durable tier, preserving its version
    fn demote(&mut self, entry: CacheEntry<V>) {
        let same_version = self
            .durable
            .get(&entry.key)
            .is_some_and(|d| d.version == entry.version);

        if same_version {
            // The durable copy already holds this write; carry the access history over
            if let Some(durable) = self.durable.get_mut(&entry.key) {
                durable.access_count = durable.access_count.max(entry.access_count);
                durable.last_accessed_at = durable.last_accessed_at.max(entry.last_accessed_at);
            }
            return;
        }

        let mut copy = entry;
        copy.status = EntryStatus::Stale;
        self.insert_durable(copy, true);
    }

    /// Drop least recently accessed durable copies until both durable
    /// bounds hold, preferring copies the backend already has
    pub fn enforce_durable_capacity(&mut self, protect: Option<&str>) {
        if !self.limits.durable_enabled {
            return;
        }
        while self.durable_over_capacity() {
            let victim = {
                let only_one = self.durable.len() == 1;
                let dirty = &self.dirty;
                self.durable
                    .values()
                    .filter(|e| only_one || Some(e.key.as_str()) != protect)
                    .min_by(|a, b| {
                        (dirty.contains(&a.key), a.last_accessed_at, &a.key).cmp(&(
                            dirty.contains(&b.key),
                            b.last_accessed_at,
                            &b.key,
                        ))
                    })
                    .map(|e| e.key.clone())
            };
            let Some(victim) = victim else {
                break;
            };
            if self.dirty.contains(&victim) {
                warn!("Dropping unsynced durable copy of {}", victim);
            }
            self.remove_durable(&victim);
            self.changes.push(TierChange::Evicted {
                key: victim,
                tier: Tier::Durable,
                demoted: false,
            });
        }
    }

    // ------------------------------------------------------------------
    // Expiry and index hygiene
    // ------------------------------------------------------------------

    fn expire_copy(&mut self, key: &str, tier: Tier) {
        let removed = match tier {
            Tier::Volatile => self.remove_volatile(key).is_some(),
            Tier::Durable => self.remove_durable(key).is_some(),
        };
        if !removed {
            return;
        }
        if tier == Tier::Durable && self.limits.durable_enabled {
            self.pending_deletes.insert(key.to_string());
        }
        self.changes.push(TierChange::Expired {
            key: key.to_string(),
            tier,
        });
    }

    /// Purge every expired copy in both tiers; returns how many copies went
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired: Vec<(String, Tier)> = Vec::new();
        for tier in [Tier::Volatile, Tier::Durable] {
            expired.extend(
                self.map(tier)
                    .values()
                    .filter(|e| e.is_expired(now))
                    .map(|e| (e.key.clone(), tier)),
            );
        }
        for (key, tier) in &expired {
            self.expire_copy(key, *tier);
        }
        expired.len()
    }

    /// Drop index entries for keys that exist in neither tier
    pub fn prune_tags(&mut self) -> usize {
        let volatile = &self.volatile;
        let durable = &self.durable;
        self.tags
            .prune(|key| volatile.contains_key(key) || durable.contains_key(key))
    }

    // ------------------------------------------------------------------
    // Sync support
    // ------------------------------------------------------------------

    /// Make every volatile entry agree with its durable counterpart
    pub fn reconcile(&mut self, resolution: ConflictResolution) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        if !self.limits.durable_enabled {
            return outcome;
        }

        let keys: Vec<String> = self.volatile.keys().cloned().collect();
        for key in keys {
            let Some(volatile) = self.volatile.get(&key) else {
                // Evicted earlier in this pass
                continue;
            };
            let durable_version = self.durable.get(&key).map(|d| d.version.as_str());
            if durable_version == Some(volatile.version.as_str()) {
                continue;
            }

            let volatile = volatile.clone();
            let Some(durable) = self.durable.get(&key).cloned() else {
                let mut copy = volatile.copy_to(Tier::Durable);
                copy.status = EntryStatus::Stale;
                self.insert_durable(copy, true);
                outcome.copied += 1;
                continue;
            };

            outcome.conflicts += 1;
            self.settle_conflict(volatile, durable, resolution);
        }

        outcome
    }

    fn settle_conflict(
        &mut self,
        volatile: CacheEntry<V>,
        durable: CacheEntry<V>,
        resolution: ConflictResolution,
    ) {
        let volatile_wins = match resolution {
            ConflictResolution::VolatileWins => true,
            ConflictResolution::DurableWins => false,
            ConflictResolution::Merge => volatile.created_at >= durable.created_at,
        };
        let (mut winner, loser) = if volatile_wins {
            (volatile, durable)
        } else {
            (durable, volatile)
        };

        let mut tags_grew = false;
        if resolution == ConflictResolution::Merge {
            for tag in loser.tags {
                if !winner.tags.contains(&tag) {
                    winner.size_bytes += tag.len() as u64;
                    winner.tags.insert(tag);
                    tags_grew = true;
                }
            }
        }

        debug!(
            "Sync conflict on {} resolved as {:?} (volatile_wins={})",
            winner.key, resolution, volatile_wins
        );

        if volatile_wins || tags_grew {
            let mut copy = winner.copy_to(Tier::Durable);
            copy.status = EntryStatus::Stale;
            self.insert_durable(copy, true);
        }
        self.insert_volatile(winner);
    }

    /// Clones of every dirty durable copy, to be saved outside the lock.
    /// Stored copies are flagged `Updating` until the outcome is reported.
    pub fn dirty_snapshot(&mut self) -> Vec<CacheEntry<V>> {
        let mut snapshot = Vec::with_capacity(self.dirty.len());
        let mut orphaned = Vec::new();

        for key in &self.dirty {
            match self.durable.get_mut(key) {
                Some(entry) => {
                    entry.status = EntryStatus::Updating;
                    let mut copy = entry.clone();
                    copy.status = EntryStatus::Fresh;
                    snapshot.push(copy);
                    *self.in_flight.entry(key.clone()).or_insert(0) += 1;
                }
                None => orphaned.push(key.clone()),
            }
        }
        for key in orphaned {
            self.dirty.remove(&key);
        }

        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    /// The backend now holds `version` of `key`. Returns whether that is
    /// still the current version; if not, the key is dirtied again.
    pub fn mark_persisted(&mut self, key: &str, version: &str) -> bool {
        let revoked = self.land(key);
        let Some(durable) = self.durable.get_mut(key) else {
            if revoked {
                // The key was deleted while the save ran
                self.queue_delete(key);
            }
            return false;
        };

        if durable.version != version {
            // A newer write landed while this one was in flight
            durable.status = EntryStatus::Stale;
            self.dirty.insert(key.to_string());
            return false;
        }

        durable.status = EntryStatus::Fresh;
        self.dirty.remove(key);
        if let Some(volatile) = self.volatile.get_mut(key) {
            if volatile.version == version {
                volatile.status = EntryStatus::Fresh;
            }
        }
        true
    }

    /// Saving `version` of `key` failed; the key stays dirty
    pub fn mark_save_failed(&mut self, key: &str, version: &str) {
        if self.land(key) && !self.durable.contains_key(key) {
            // A failed save may still have reached the backend
            self.queue_delete(key);
            return;
        }
        for tier in [Tier::Volatile, Tier::Durable] {
            if let Some(entry) = self.map_mut(tier).get_mut(key) {
                if entry.version == version {
                    entry.status = EntryStatus::Stale;
                }
            }
        }
        if self.durable.contains_key(key) {
            self.dirty.insert(key.to_string());
        }
    }

    /// Retire one in-flight save of `key`. Returns whether the key was
    /// removed from memory while that save was running.
    fn land(&mut self, key: &str) -> bool {
        let remaining = match self.in_flight.get_mut(key) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return false,
        };
        if remaining > 0 {
            return self.revoked.contains(key);
        }
        self.in_flight.remove(key);
        self.revoked.remove(key)
    }

    pub fn queue_delete(&mut self, key: &str) {
        if self.limits.durable_enabled {
            self.pending_deletes.insert(key.to_string());
        }
    }

    /// A new write supersedes a pending delete
    pub fn cancel_delete(&mut self, key: &str) {
        self.pending_deletes.remove(key);
    }

    /// Whether the backend copy of `key` must not be trusted: a delete is
    /// queued, or a save of a since-deleted copy is still running
    pub fn is_pending_delete(&self, key: &str) -> bool {
        self.pending_deletes.contains(key) || self.revoked.contains(key)
    }

    pub fn pending_deletes(&self) -> Vec<String> {
        self.pending_deletes.iter().cloned().collect()
    }

    /// The backend dropped `key`. If the key was written again in the
    /// meantime its durable copy must be saved again.
    pub fn confirm_delete(&mut self, key: &str) {
        self.pending_deletes.remove(key);
        if self.durable.contains_key(key) {
            self.dirty.insert(key.to_string());
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn map(&self, tier: Tier) -> &HashMap<String, CacheEntry<V>> {
        match tier {
            Tier::Volatile => &self.volatile,
            Tier::Durable => &self.durable,
        }
    }

    fn map_mut(&mut self, tier: Tier) -> &mut HashMap<String, CacheEntry<V>> {
        match tier {
            Tier::Volatile => &mut self.volatile,
            Tier::Durable => &mut self.durable,
        }
    }

    pub fn entry(&self, tier: Tier, key: &str) -> Option<&CacheEntry<V>> {
        self.map(tier).get(key)
    }

    pub fn contains(&self, tier: Tier, key: &str) -> bool {
        self.map(tier).contains_key(key)
    }

    /// Every key held by either tier, de-duplicated and sorted
    pub fn known_keys(&self) -> BTreeSet<String> {
        self.volatile
            .keys()
            .chain(self.durable.keys())
            .cloned()
            .collect()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tags.keys_for(tag)
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.contains(key)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn sizes(&self) -> TierSizes {
        let durable_only = self
            .durable
            .keys()
            .filter(|k| !self.volatile.contains_key(*k))
            .count();
        TierSizes {
            volatile_entries: self.volatile.len(),
            volatile_bytes: self.volatile_bytes,
            durable_entries: self.durable.len(),
            durable_bytes: self.durable_bytes,
            distinct_entries: self.volatile.len() + durable_only,
        }
    }

    pub fn drain_changes(&mut self) -> Vec<TierChange> {
        std::mem::take(&mut self.changes)
    }
}
