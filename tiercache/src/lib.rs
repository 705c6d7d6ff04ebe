pub mod cache;
pub mod compression;
pub mod config;
pub mod core;
pub mod metrics;
pub mod monitoring;
pub mod storage;

// Re-export commonly used types
pub use cache::{
    CacheStatistics, EvictionStrategy, MaintenanceReport, SyncReport, SyncStats, TierStats,
    TieredCache,
};
pub use compression::{CodecPipeline, CompressionAlgorithm, Compressor, PayloadCodec};
pub use config::{CacheConfig, ConflictResolution};
pub use core::{
    CacheEntry, CacheError, CacheKey, CacheValue, Clock, EntryStatus, ManualClock, Result,
    SetOptions, SystemClock, Tier,
};
pub use metrics::encode_metrics;
pub use monitoring::{CacheEvent, EventKind, EventLog};
pub use storage::{FileStorage, InMemoryStorage, StorageBackend};
