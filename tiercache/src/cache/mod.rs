//! Cache Module
//!
//! Two storage tiers behind one facade:
//! - Volatile: bounded in-process map with pluggable eviction
//! - Durable: larger in-process map mirrored to a storage backend
//!
//! The [`TierManager`] moves entries between the tiers, the sync engine
//! keeps the durable tier and its backend in agreement, and [`TieredCache`]
//! ties both together with statistics and events.

pub mod eviction;
pub mod stats;
pub mod sync;
pub mod tag_index;
pub mod tier_manager;
pub mod tiered_cache;

pub use eviction::{EvictionPolicy, EvictionStrategy};
pub use stats::{CacheStatistics, SyncStats, TierStats};
pub use sync::SyncReport;
pub use tag_index::TagIndex;
pub use tier_manager::{Lookup, TierChange, TierManager};
pub use tiered_cache::{MaintenanceReport, TieredCache};
