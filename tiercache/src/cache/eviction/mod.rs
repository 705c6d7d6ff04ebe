//! Volatile-tier eviction strategies
//!
//! - Recency: least recently accessed entry
//! - Frequency: least accessed entry
//! - Insertion: oldest written entry
//!
//! Every strategy breaks ties on the lowest key so victim selection is
//! reproducible.

use crate::core::types::CacheEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod frequency;
pub mod insertion;
pub mod recency;

pub use frequency::FrequencyPolicy;
pub use insertion::InsertionPolicy;
pub use recency::RecencyPolicy;

/// Cache eviction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least Recently Used
    #[default]
    Recency,
    /// Least Frequently Used
    Frequency,
    /// First In, First Out
    Insertion,
}

impl EvictionStrategy {
    /// Build the policy implementing this strategy
    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionStrategy::Recency => Box::new(RecencyPolicy),
            EvictionStrategy::Frequency => Box::new(FrequencyPolicy),
            EvictionStrategy::Insertion => Box::new(InsertionPolicy),
        }
    }
}

/// The fields of an entry that victim selection looks at
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub key: &'a str,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

impl<'a, V> From<&'a CacheEntry<V>> for Candidate<'a> {
    fn from(entry: &'a CacheEntry<V>) -> Self {
        Self {
            key: &entry.key,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            access_count: entry.access_count,
        }
    }
}

pub trait EvictionPolicy: Send + Sync {
    fn strategy(&self) -> EvictionStrategy;

    /// Pick one key to evict, or `None` when there are no candidates
    fn select_victim<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'a>>,
    ) -> Option<&'a str>;
}

/// Minimum by `rank`, ties broken by lowest key
pub(crate) fn min_by_rank<'a, R: Ord>(
    candidates: &mut dyn Iterator<Item = Candidate<'a>>,
    rank: impl Fn(&Candidate<'a>) -> R,
) -> Option<&'a str> {
    candidates
        .min_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.key.cmp(b.key)))
        .map(|c| c.key)
}
