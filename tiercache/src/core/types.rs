use super::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Cache key, unique across both tiers
pub type CacheKey = String;

/// Bounds every cached value type satisfies. Values must be serializable
/// so they can be sized and persisted.
pub trait CacheValue: Clone + Serialize + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + Send + Sync + 'static {}

/// Storage tier holding a copy of an entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// L1: process-local, size-bounded
    Volatile,
    /// L2: backed by a storage adapter
    Durable,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Volatile => "volatile",
            Tier::Durable => "durable",
        }
    }
}

/// Freshness of a stored copy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Persistence confirmed (or not required)
    #[default]
    Fresh,
    /// Newer than the copy held by the storage backend
    Stale,
    /// Past `expires_at`, waiting to be purged
    Expired,
    /// Backend save in flight
    Updating,
}

/// A single cached record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: V,
    pub tier: Tier,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: u64,
    /// Regenerated on every write; used to detect divergence between tiers
    pub version: String,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, String>,
}

impl<V: Serialize> CacheEntry<V> {
    /// Build a new entry written at `now` that lives for `ttl`
    pub fn new(
        key: impl Into<CacheKey>,
        value: V,
        tier: Tier,
        now: DateTime<Utc>,
        ttl: Duration,
        tags: BTreeSet<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::InvalidTtl(e.to_string()))?;
        if ttl <= chrono::Duration::zero() {
            return Err(CacheError::InvalidTtl("TTL must be positive".to_string()));
        }
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| CacheError::InvalidTtl("TTL overflows the clock".to_string()))?;

        let key = key.into();
        let size_bytes = estimate_size(&key, &value, &tags, &metadata)?;

        Ok(Self {
            key,
            value,
            tier,
            status: EntryStatus::Fresh,
            created_at: now,
            last_accessed_at: now,
            expires_at,
            access_count: 0,
            size_bytes,
            version: new_version(),
            tags,
            metadata,
        })
    }
}

impl<V> CacheEntry<V> {
    /// Check if the entry has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Record a successful read
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    /// Copy of this entry placed in another tier; version is preserved
    pub fn copy_to(&self, tier: Tier) -> Self
    where
        V: Clone,
    {
        let mut copy = self.clone();
        copy.tier = tier;
        copy
    }
}

/// Generate a fresh entry version
pub fn new_version() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Estimate the accounted size of an entry.
///
/// The value is measured through its JSON encoding; a value that cannot be
/// encoded cannot be sized and is rejected.
pub fn estimate_size<V: Serialize>(
    key: &str,
    value: &V,
    tags: &BTreeSet<String>,
    metadata: &BTreeMap<String, String>,
) -> Result<u64> {
    let value_len = serde_json::to_vec(value)
        .map_err(|e| CacheError::SerializationFailure(format!("{}: {}", key, e)))?
        .len();
    let tags_len: usize = tags.iter().map(String::len).sum();
    let meta_len: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();

    Ok((key.len() + value_len + tags_len + meta_len) as u64)
}

/// Options accepted by `TieredCache::set`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Time to live; tier default when `None`
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    /// Write the durable tier only
    pub durable_only: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn durable_only(mut self) -> Self {
        self.durable_only = true;
        self
    }
}
