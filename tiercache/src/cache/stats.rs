use crate::core::types::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Per-tier counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    /// Lookups this tier could not answer, including ones a lower tier or
    /// the backend then served
    pub misses: u64,
    pub evictions: u64,
    /// Rolling average, milliseconds
    pub avg_hit_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    pub attempts: u64,
    pub conflicts: u64,
    pub errors: u64,
    /// Entries successfully written to the backend by sync ticks
    pub flushed: u64,
}

/// Snapshot returned by `TieredCache::get_statistics`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Distinct keys across both tiers
    pub total_entries: usize,
    pub volatile: TierStats,
    pub durable: TierStats,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Rolling average, milliseconds
    pub avg_miss_latency_ms: f64,
    pub evictions: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub sync: SyncStats,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Rolling average update: `avg = (avg + sample) / 2`
pub fn rolling_average(avg: f64, sample: f64) -> f64 {
    (avg + sample) / 2.0
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

/// Running counters behind the statistics snapshot
#[derive(Debug, Default)]
pub struct StatsCollector {
    current: CacheStatistics,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut TierStats {
        match tier {
            Tier::Volatile => &mut self.current.volatile,
            Tier::Durable => &mut self.current.durable,
        }
    }

    pub fn record_hit(&mut self, tier: Tier, elapsed: Duration) {
        self.current.hits += 1;
        let stats = self.tier_mut(tier);
        stats.hits += 1;
        stats.avg_hit_latency_ms = rolling_average(stats.avg_hit_latency_ms, millis(elapsed));
    }

    pub fn record_miss(&mut self, elapsed: Duration) {
        self.current.misses += 1;
        self.current.avg_miss_latency_ms =
            rolling_average(self.current.avg_miss_latency_ms, millis(elapsed));
    }

    pub fn record_tier_miss(&mut self, tier: Tier) {
        self.tier_mut(tier).misses += 1;
    }

    pub fn record_eviction(&mut self, tier: Tier) {
        self.current.evictions += 1;
        self.tier_mut(tier).evictions += 1;
    }

    pub fn record_promotion(&mut self) {
        self.current.promotions += 1;
    }

    pub fn record_demotion(&mut self) {
        self.current.demotions += 1;
    }

    pub fn record_sync_attempt(&mut self) {
        self.current.sync.attempts += 1;
    }

    pub fn record_sync_conflict(&mut self) {
        self.current.sync.conflicts += 1;
    }

    pub fn record_sync_error(&mut self) {
        self.current.sync.errors += 1;
    }

    pub fn record_flushed(&mut self, count: u64) {
        self.current.sync.flushed += count;
    }

    /// Overwrite the size gauges
    pub fn refresh(&mut self, sizes: TierSizes, now: DateTime<Utc>) {
        self.current.volatile.entries = sizes.volatile_entries;
        self.current.volatile.bytes = sizes.volatile_bytes;
        self.current.durable.entries = sizes.durable_entries;
        self.current.durable.bytes = sizes.durable_bytes;
        self.current.total_entries = sizes.distinct_entries;
        self.current.last_updated = Some(now);
    }

    pub fn snapshot(&self) -> CacheStatistics {
        let mut snapshot = self.current.clone();
        let total = snapshot.hits + snapshot.misses;
        snapshot.hit_rate = if total == 0 {
            0.0
        } else {
            snapshot.hits as f64 / total as f64
        };
        snapshot
    }
}

/// Entry and byte counts of both tiers at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierSizes {
    pub volatile_entries: usize,
    pub volatile_bytes: u64,
    pub durable_entries: usize,
    pub durable_bytes: u64,
    pub distinct_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average_halves_toward_sample() {
        let mut stats = StatsCollector::new();
        stats.record_hit(Tier::Volatile, Duration::from_millis(8));
        assert_eq!(stats.snapshot().volatile.avg_hit_latency_ms, 4.0);

        stats.record_hit(Tier::Volatile, Duration::from_millis(4));
        assert_eq!(stats.snapshot().volatile.avg_hit_latency_ms, 4.0);

        stats.record_hit(Tier::Volatile, Duration::from_millis(12));
        assert_eq!(stats.snapshot().volatile.avg_hit_latency_ms, 8.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = StatsCollector::new();
        stats.record_hit(Tier::Durable, Duration::ZERO);
        stats.record_hit(Tier::Volatile, Duration::ZERO);
        stats.record_hit(Tier::Volatile, Duration::ZERO);
        stats.record_tier_miss(Tier::Volatile);
        stats.record_tier_miss(Tier::Durable);
        stats.record_miss(Duration::from_millis(2));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.volatile.misses, 1);
        assert_eq!(snapshot.durable.misses, 1);
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.durable.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.hit_rate, 0.75);
        assert_eq!(snapshot.avg_miss_latency_ms, 1.0);
    }

    #[test]
    fn test_empty_hit_rate_is_zero() {
        assert_eq!(StatsCollector::new().snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_evictions_counted_per_tier_and_globally() {
        let mut stats = StatsCollector::new();
        stats.record_eviction(Tier::Volatile);
        stats.record_eviction(Tier::Volatile);
        stats.record_eviction(Tier::Durable);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evictions, 3);
        assert_eq!(snapshot.volatile.evictions, 2);
        assert_eq!(snapshot.durable.evictions, 1);
    }
}
