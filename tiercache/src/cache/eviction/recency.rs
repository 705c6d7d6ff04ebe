//! LRU (Least Recently Used) victim selection

use super::{Candidate, EvictionPolicy, EvictionStrategy, min_by_rank};

/// Evicts the entry with the oldest `last_accessed_at`
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyPolicy;

impl EvictionPolicy for RecencyPolicy {
    fn strategy(&self) -> EvictionStrategy {
        EvictionStrategy::Recency
    }

    fn select_victim<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'a>>,
    ) -> Option<&'a str> {
        min_by_rank(candidates, |c| c.last_accessed_at)
    }
}
