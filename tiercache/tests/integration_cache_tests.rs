use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tiercache::{
    CacheConfig, EventKind, InMemoryStorage, ManualClock, SetOptions, TieredCache,
};

fn test_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.sync.retry_delay_ms = 1;
    config
}

fn build(config: CacheConfig) -> (TieredCache<String>, InMemoryStorage<String>, ManualClock) {
    let backend = InMemoryStorage::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let cache = TieredCache::new(config, Arc::new(backend.clone()), Arc::new(clock.clone()))
        .unwrap();
    (cache, backend, clock)
}

#[tokio::test]
async fn test_set_get_round_trip() {
    let (cache, backend, _) = build(test_config());

    cache
        .set("user:1", "alice".to_string(), SetOptions::new())
        .await
        .unwrap();

    assert_eq!(cache.get("user:1").await, Some("alice".to_string()));
    assert_eq!(cache.get("user:2").await, None);
    assert!(backend.contains("user:1"));
}

#[tokio::test]
async fn test_overwrite_replaces_value() {
    let (cache, _, _) = build(test_config());

    cache.set("k", "v1".to_string(), SetOptions::new()).await.unwrap();
    cache.set("k", "v2".to_string(), SetOptions::new()).await.unwrap();

    assert_eq!(cache.get("k").await, Some("v2".to_string()));
    assert_eq!(cache.get_statistics().await.total_entries, 1);
}

#[tokio::test]
async fn test_expired_entry_is_absent_and_purged() {
    let (cache, backend, clock) = build(test_config());

    cache
        .set(
            "session",
            "token".to_string(),
            SetOptions::new().with_ttl(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert!(cache.has("session").await);

    clock.advance(Duration::from_secs(2));

    // Both copies expired; maintenance sweeps them and deletes the backend copy
    let report = cache.maintenance().await;
    assert_eq!(report.expired, 2);
    assert_eq!(report.total_entries, 0);
    assert!(!backend.contains("session"));
    assert_eq!(cache.get("session").await, None);
}

#[tokio::test]
async fn test_get_after_expiry_returns_none() {
    let (cache, _, clock) = build(test_config());

    cache
        .set(
            "k",
            "v".to_string(),
            SetOptions::new().with_ttl(Duration::from_millis(500)),
        )
        .await
        .unwrap();
    clock.advance(Duration::from_millis(500));

    assert_eq!(cache.get("k").await, None);
    assert!(!cache.has("k").await);
}

#[tokio::test]
async fn test_capacity_bound_holds_after_every_set() {
    let mut config = test_config();
    config.volatile.max_entries = 3;
    let (cache, _, clock) = build(config);

    for i in 0..10 {
        clock.advance(Duration::from_millis(10));
        cache
            .set(&format!("k{}", i), format!("v{}", i), SetOptions::new())
            .await
            .unwrap();
        let stats = cache.get_statistics().await;
        assert!(stats.volatile.entries <= 3);
    }

    let stats = cache.get_statistics().await;
    assert_eq!(stats.volatile.evictions, 7);
    // Durable copies survive volatile eviction
    assert_eq!(stats.total_entries, 10);
}

#[tokio::test]
async fn test_recency_eviction_order() {
    let mut config = test_config();
    config.volatile.max_entries = 2;
    let (cache, _, clock) = build(config);
    let step = Duration::from_secs(1);

    cache.set("A", "a".to_string(), SetOptions::new()).await.unwrap();
    clock.advance(step);
    cache.set("B", "b".to_string(), SetOptions::new()).await.unwrap();
    clock.advance(step);
    cache.get("A").await;
    clock.advance(step);
    cache.get("B").await;
    clock.advance(step);
    cache.get("A").await;
    clock.advance(step);
    cache.set("C", "c".to_string(), SetOptions::new()).await.unwrap();

    let evicted: Vec<_> = cache
        .get_events(100)
        .into_iter()
        .filter(|e| e.kind == EventKind::Evict)
        .filter_map(|e| e.key)
        .collect();
    assert_eq!(evicted, vec!["B".to_string()]);
}

#[tokio::test]
async fn test_tag_invalidation_is_complete() {
    let (cache, _, _) = build(test_config());

    cache
        .set("a", "1".to_string(), SetOptions::new().with_tags(["x"]))
        .await
        .unwrap();
    cache
        .set("b", "2".to_string(), SetOptions::new().with_tags(["x", "y"]))
        .await
        .unwrap();
    cache
        .set("c", "3".to_string(), SetOptions::new().with_tags(["y"]))
        .await
        .unwrap();

    let before = cache.get_statistics().await.total_entries;
    assert_eq!(cache.invalidate_by_tag("x").await, 2);
    let after = cache.get_statistics().await.total_entries;

    assert_eq!(before - after, 2);
    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get("b").await, None);
    assert_eq!(cache.get("c").await, Some("3".to_string()));
    assert_eq!(cache.invalidate_by_tag("x").await, 0);
}

#[tokio::test]
async fn test_retagging_replaces_associations() {
    let (cache, _, _) = build(test_config());

    cache
        .set("k", "v".to_string(), SetOptions::new().with_tags(["old"]))
        .await
        .unwrap();
    cache
        .set("k", "v".to_string(), SetOptions::new().with_tags(["new"]))
        .await
        .unwrap();

    assert_eq!(cache.invalidate_by_tag("old").await, 0);
    assert_eq!(cache.invalidate_by_tag("new").await, 1);
}

#[tokio::test]
async fn test_invalidate_by_pattern() {
    let (cache, backend, _) = build(test_config());

    for key in ["user:1", "user:2", "session:1"] {
        cache.set(key, key.to_string(), SetOptions::new()).await.unwrap();
    }
    // Durable-only keys are matched too
    cache
        .set("user:3", "x".to_string(), SetOptions::new().durable_only())
        .await
        .unwrap();

    assert_eq!(cache.invalidate_by_pattern("^user:").await.unwrap(), 3);
    assert!(cache.has("session:1").await);
    assert!(!backend.contains("user:3"));
}

#[tokio::test]
async fn test_promotion_on_third_durable_access() {
    let mut config = test_config();
    config.promotion.recent_window_ms = 1;
    let (cache, _, clock) = build(config);

    cache
        .set("hot", "v".to_string(), SetOptions::new().durable_only())
        .await
        .unwrap();

    for _ in 0..2 {
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("hot").await, Some("v".to_string()));
        assert_eq!(cache.get_statistics().await.volatile.entries, 0);
    }

    clock.advance(Duration::from_secs(1));
    assert_eq!(cache.get("hot").await, Some("v".to_string()));

    let stats = cache.get_statistics().await;
    assert_eq!(stats.volatile.entries, 1);
    assert_eq!(stats.durable.entries, 1);
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.durable.hits, 3);
}

#[tokio::test]
async fn test_hot_entry_demoted_on_eviction() {
    let mut config = test_config();
    config.volatile.max_entries = 1;
    config.sync.on_write = false;
    let (cache, _, clock) = build(config);

    cache.set("hot", "v".to_string(), SetOptions::new()).await.unwrap();
    cache.get("hot").await;
    cache.get("hot").await;
    clock.advance(Duration::from_secs(1));
    cache.set("next", "n".to_string(), SetOptions::new()).await.unwrap();

    let stats = cache.get_statistics().await;
    assert_eq!(stats.demotions, 1);
    assert_eq!(stats.volatile.evictions, 1);
    assert_eq!(cache.get("hot").await, Some("v".to_string()));
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let (cache, backend, _) = build(test_config());

    cache.set("a", "1".to_string(), SetOptions::new().with_tags(["t"])).await.unwrap();
    cache.set("b", "2".to_string(), SetOptions::new()).await.unwrap();

    cache.clear().await;
    cache.clear().await;

    let stats = cache.get_statistics().await;
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.volatile.bytes, 0);
    assert!(backend.is_empty());
    assert!(cache.get_events(10).is_empty());
    assert_eq!(cache.invalidate_by_tag("t").await, 0);
}

#[tokio::test]
async fn test_delete_reports_existence() {
    let (cache, backend, _) = build(test_config());

    cache.set("k", "v".to_string(), SetOptions::new()).await.unwrap();

    assert!(cache.delete("k").await);
    assert!(!cache.delete("k").await);
    assert!(!backend.contains("k"));
    assert_eq!(cache.get("k").await, None);
}

#[tokio::test]
async fn test_has_does_not_count_as_access() {
    let (cache, _, _) = build(test_config());

    cache.set("k", "v".to_string(), SetOptions::new()).await.unwrap();
    for _ in 0..3 {
        assert!(cache.has("k").await);
    }
    assert!(!cache.has("missing").await);

    let stats = cache.get_statistics().await;
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_has_sees_backend_only_entries() {
    let backend = InMemoryStorage::<String>::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let open = || {
        TieredCache::new(
            test_config(),
            Arc::new(backend.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap()
    };

    let first = open();
    first.set("k", "v".to_string(), SetOptions::new()).await.unwrap();
    first
        .set(
            "short",
            "v".to_string(),
            SetOptions::new().with_ttl(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    let second = open();
    assert!(second.has("k").await);
    assert_eq!(second.get_statistics().await.hits, 0);
    assert_eq!(second.get("k").await, Some("v".to_string()));

    clock.advance(Duration::from_secs(2));
    assert!(!second.has("short").await);
    assert_eq!(second.get("short").await, None);

    backend.set_available(false);
    assert!(!second.has("missing").await);
}

#[tokio::test]
async fn test_statistics_hit_rate() {
    let (cache, _, _) = build(test_config());

    cache.set("a", "1".to_string(), SetOptions::new()).await.unwrap();
    cache
        .set("d", "2".to_string(), SetOptions::new().durable_only())
        .await
        .unwrap();
    cache.get("a").await;
    cache.get("a").await;
    cache.get("d").await;
    cache.get("zzz").await;

    let stats = cache.get_statistics().await;
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.volatile.hits, 2);
    assert_eq!(stats.durable.hits, 1);
    assert_eq!(stats.misses, 1);
    // "d" missed the volatile tier before the durable tier served it
    assert_eq!(stats.volatile.misses, 2);
    assert_eq!(stats.durable.misses, 1);
    assert_eq!(stats.hit_rate, 0.75);
    assert!(stats.last_updated.is_some());
}

#[tokio::test]
async fn test_event_log_bounded_newest_first() {
    let mut config = test_config();
    config.metrics.max_events = 5;
    let (cache, _, _) = build(config);

    for i in 0..10 {
        cache.set(&format!("k{}", i), "v".to_string(), SetOptions::new()).await.unwrap();
    }

    let events = cache.get_events(100);
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].key.as_deref(), Some("k9"));
    assert_eq!(events[4].key.as_deref(), Some("k5"));
    assert!(events.windows(2).all(|w| w[0].id > w[1].id));
    assert!(events.iter().all(|e| e.kind == EventKind::Set));

    assert_eq!(cache.get_events(2).len(), 2);
}

#[tokio::test]
async fn test_durable_disabled_never_touches_backend() {
    let mut config = test_config();
    config.durable.enabled = false;
    config.volatile.max_entries = 2;
    let (cache, backend, _) = build(config);

    for key in ["a", "b", "c"] {
        cache.set(key, key.to_string(), SetOptions::new()).await.unwrap();
    }
    cache.get("missing").await;
    cache.delete("a").await;
    cache.maintenance().await;

    assert_eq!(backend.save_count(), 0);
    assert!(backend.is_empty());
    assert_eq!(cache.get_statistics().await.durable.entries, 0);
}

#[tokio::test]
async fn test_clones_share_state() {
    let (cache, _, _) = build(test_config());
    let other = cache.clone();

    cache.set("k", "v".to_string(), SetOptions::new()).await.unwrap();
    assert_eq!(other.get("k").await, Some("v".to_string()));
}
