//! Prometheus Metrics for the tiered cache
//!
//! Process-wide counters and gauges, fed by `TieredCache` when
//! `metrics.enabled` is set:
//! - Operations and latency
//! - Tier sizes
//! - Evictions, promotions, demotions
//! - Sync outcomes

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder, register_histogram_vec,
    register_int_counter_vec, register_int_gauge_vec,
};

use crate::cache::stats::TierSizes;

lazy_static! {
    // ============================================================================
    // Operation Metrics
    // ============================================================================

    /// Total cache operations by type (get, set, delete, ...) and result
    pub static ref CACHE_OPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_operations_total",
        "Total number of cache operations by type and result",
        &["operation", "result"]
    ).unwrap();

    /// Cache operation latency in seconds
    pub static ref CACHE_OP_DURATION: HistogramVec = register_histogram_vec!(
        "tiercache_operation_duration_seconds",
        "Cache operation latency in seconds",
        &["operation"],
        vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]
    ).unwrap();

    // ============================================================================
    // Tier Metrics
    // ============================================================================

    /// Entries held per tier
    pub static ref CACHE_ENTRIES: IntGaugeVec = register_int_gauge_vec!(
        "tiercache_entries",
        "Number of entries held by each tier",
        &["tier"]
    ).unwrap();

    /// Accounted bytes per tier
    pub static ref CACHE_BYTES: IntGaugeVec = register_int_gauge_vec!(
        "tiercache_bytes",
        "Accounted size of each tier in bytes",
        &["tier"]
    ).unwrap();

    /// Capacity evictions per tier
    pub static ref CACHE_EVICTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_evictions_total",
        "Total number of capacity evictions by tier",
        &["tier"]
    ).unwrap();

    /// Movements between tiers
    pub static ref CACHE_TIER_MOVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_tier_moves_total",
        "Total number of promotions and demotions",
        &["direction"]
    ).unwrap();

    // ============================================================================
    // Sync Metrics
    // ============================================================================

    /// Sync ticks and backend writes by outcome
    pub static ref CACHE_SYNC_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_sync_total",
        "Sync activity by outcome (tick, flushed, conflict, error)",
        &["outcome"]
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record cache operation
pub fn record_cache_op(operation: &str, result: &str, duration_secs: f64) {
    CACHE_OPS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
    CACHE_OP_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Overwrite the tier gauges
pub fn update_tier_sizes(sizes: &TierSizes) {
    CACHE_ENTRIES
        .with_label_values(&["volatile"])
        .set(sizes.volatile_entries as i64);
    CACHE_ENTRIES
        .with_label_values(&["durable"])
        .set(sizes.durable_entries as i64);
    CACHE_BYTES
        .with_label_values(&["volatile"])
        .set(sizes.volatile_bytes as i64);
    CACHE_BYTES
        .with_label_values(&["durable"])
        .set(sizes.durable_bytes as i64);
}

/// Record eviction
pub fn record_eviction(tier: &str) {
    CACHE_EVICTIONS_TOTAL.with_label_values(&[tier]).inc();
}

/// Record promotion ("promote") or demotion ("demote")
pub fn record_tier_move(direction: &str) {
    CACHE_TIER_MOVES_TOTAL.with_label_values(&[direction]).inc();
}

/// Record sync outcome
pub fn record_sync(outcome: &str, count: u64) {
    CACHE_SYNC_TOTAL.with_label_values(&[outcome]).inc_by(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_cache_op() {
        record_cache_op("get", "hit", 0.001);
        record_cache_op("set", "ok", 0.002);

        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("tiercache_operations_total"));
        assert!(metrics.contains("tiercache_operation_duration_seconds"));
    }

    #[test]
    fn test_tier_gauges() {
        update_tier_sizes(&TierSizes {
            volatile_entries: 3,
            volatile_bytes: 120,
            durable_entries: 5,
            durable_bytes: 400,
            distinct_entries: 5,
        });

        assert_eq!(CACHE_ENTRIES.with_label_values(&["durable"]).get(), 5);
        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("tiercache_bytes"));
    }

    #[test]
    fn test_sync_counter() {
        let before = CACHE_SYNC_TOTAL.with_label_values(&["flushed"]).get();
        record_sync("flushed", 4);
        assert!(CACHE_SYNC_TOTAL.with_label_values(&["flushed"]).get() >= before + 4);
    }
}
