// Error Handling Tests
// Only caller errors surface; storage failures are absorbed

use std::collections::HashMap;
use std::time::Duration;
use tiercache::{CacheConfig, CacheError, SetOptions, TieredCache};

#[test]
fn test_error_display() {
    let err = CacheError::StorageUnavailable("disk offline".to_string());
    assert_eq!(err.to_string(), "Storage unavailable: disk offline");

    let err = CacheError::Checksum {
        expected: 0xdeadbeef,
        actual: 0x1,
    };
    assert_eq!(
        err.to_string(),
        "Checksum mismatch: expected deadbeef, got 00000001"
    );
}

#[test]
fn test_error_classification() {
    assert!(CacheError::StorageUnavailable("x".into()).is_storage_failure());
    assert!(CacheError::Io("x".into()).is_storage_failure());
    assert!(!CacheError::InvalidTtl("x".into()).is_storage_failure());

    assert!(CacheError::InvalidPattern("x".into()).is_caller_error());
    assert!(CacheError::SerializationFailure("x".into()).is_caller_error());
    assert!(!CacheError::StorageUnavailable("x".into()).is_caller_error());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: CacheError = io.into();
    assert!(matches!(err, CacheError::Io(_)));
}

#[tokio::test]
async fn test_zero_ttl_rejected_without_side_effects() {
    let cache = TieredCache::<String>::in_memory(CacheConfig::default()).unwrap();

    let result = cache
        .set(
            "k",
            "v".to_string(),
            SetOptions::new().with_ttl(Duration::ZERO),
        )
        .await;

    assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
    assert!(!cache.has("k").await);
    assert_eq!(cache.get_statistics().await.total_entries, 0);
}

#[tokio::test]
async fn test_unserializable_value_rejected() {
    // JSON object keys must be strings, so this value cannot be sized
    let cache = TieredCache::<HashMap<Vec<u8>, u8>>::in_memory(CacheConfig::default()).unwrap();
    let mut value = HashMap::new();
    value.insert(vec![1u8, 2], 3u8);

    let result = cache.set("k", value, SetOptions::new()).await;

    assert!(matches!(result, Err(CacheError::SerializationFailure(_))));
    assert!(!cache.has("k").await);
}

#[tokio::test]
async fn test_invalid_pattern_rejected() {
    let cache = TieredCache::<String>::in_memory(CacheConfig::default()).unwrap();
    cache.set("k", "v".to_string(), SetOptions::new()).await.unwrap();

    let result = cache.invalidate_by_pattern("[unclosed").await;

    assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
    assert!(cache.has("k").await);
}

#[tokio::test]
async fn test_missing_key_is_none_not_error() {
    let cache = TieredCache::<String>::in_memory(CacheConfig::default()).unwrap();

    assert_eq!(cache.get("nope").await, None);
    assert!(!cache.delete("nope").await);
    assert_eq!(cache.invalidate_by_tag("nope").await, 0);
}
