//! FIFO victim selection

use super::{Candidate, EvictionPolicy, EvictionStrategy, min_by_rank};

/// Evicts the entry with the oldest `created_at`
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertionPolicy;

impl EvictionPolicy for InsertionPolicy {
    fn strategy(&self) -> EvictionStrategy {
        EvictionStrategy::Insertion
    }

    fn select_victim<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'a>>,
    ) -> Option<&'a str> {
        min_by_rank(candidates, |c| c.created_at)
    }
}
