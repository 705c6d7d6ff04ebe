//! LFU (Least Frequently Used) victim selection

use super::{Candidate, EvictionPolicy, EvictionStrategy, min_by_rank};

/// Evicts the entry with the smallest access count
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyPolicy;

impl EvictionPolicy for FrequencyPolicy {
    fn strategy(&self) -> EvictionStrategy {
        EvictionStrategy::Frequency
    }

    fn select_victim<'a>(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'a>>,
    ) -> Option<&'a str> {
        min_by_rank(candidates, |c| c.access_count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::candidate;
    use super::*;

    #[test]
    fn test_lfu_basic() {
        let cands = vec![
            candidate("a", 0, 9, 3),
            candidate("b", 1, 8, 2),
            candidate("c", 2, 1, 1),
        ];

        // c was accessed least often, even though it is not the oldest
        let victim = FrequencyPolicy.select_victim(&mut cands.into_iter());
        assert_eq!(victim, Some("c"));
    }

    #[test]
    fn test_lfu_ties_are_deterministic() {
        let cands = vec![
            candidate("zeta", 0, 0, 0),
            candidate("alpha", 5, 5, 0),
            candidate("mid", 1, 1, 4),
        ];

        let victim = FrequencyPolicy.select_victim(&mut cands.into_iter());
        assert_eq!(victim, Some("alpha"));
    }
}
