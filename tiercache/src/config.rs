use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::eviction::EvictionStrategy;
use crate::compression::CompressionAlgorithm;
use crate::core::error::{CacheError, Result};

/// Main cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    pub volatile: VolatileConfig,
    pub durable: DurableConfig,
    pub sync: SyncConfig,
    pub promotion: PromotionConfig,
    pub demotion: DemotionConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// L1 tier limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatileConfig {
    pub max_entries: usize,
    pub max_bytes: u64,
    /// Default TTL for regular writes
    pub max_age_ms: u64,
    pub eviction_strategy: EvictionStrategy,
}

impl Default for VolatileConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 50 * 1024 * 1024,
            max_age_ms: 5 * 60 * 1000,
            eviction_strategy: EvictionStrategy::Recency,
        }
    }
}

/// L2 tier limits and storage knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: u64,
    /// Default TTL for `durable_only` writes
    pub max_age_ms: u64,
    /// Background sync period; 0 disables the task
    pub sync_interval_ms: u64,
    pub compression: CompressionAlgorithm,
    pub checksum: bool,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_bytes: 500 * 1024 * 1024,
            max_age_ms: 24 * 60 * 60 * 1000,
            sync_interval_ms: 30_000,
            compression: CompressionAlgorithm::None,
            checksum: false,
        }
    }
}

/// How to settle a volatile/durable version mismatch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    #[default]
    VolatileWins,
    DurableWins,
    /// Latest write wins, tags are unioned
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Persist to the backend inside `set`; otherwise defer to the sync tick
    pub on_write: bool,
    /// Read through to the backend on a durable-map miss
    pub on_read: bool,
    pub conflict_resolution: ConflictResolution,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_write: true,
            on_read: true,
            conflict_resolution: ConflictResolution::VolatileWins,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Durable -> volatile thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_access_count: u64,
    pub recent_window_ms: u64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_access_count: 3,
            recent_window_ms: 5 * 60 * 1000,
        }
    }
}

/// Volatile -> durable threshold applied to eviction victims
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemotionConfig {
    /// Victims accessed more than this many times are demoted
    pub min_access_count: u64,
}

impl Default for DemotionConfig {
    fn default() -> Self {
        Self {
            min_access_count: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Event log capacity
    pub max_events: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject contradictory or degenerate options
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(CacheError::InvalidConfiguration(msg.to_string()));

        if self.volatile.max_entries == 0 {
            return invalid("volatile.max_entries must be greater than 0");
        }
        if self.volatile.max_bytes == 0 {
            return invalid("volatile.max_bytes must be greater than 0");
        }
        if self.volatile.max_age_ms == 0 {
            return invalid("volatile.max_age_ms must be greater than 0");
        }

        if self.durable.enabled {
            if self.durable.max_entries == 0 {
                return invalid("durable.max_entries must be greater than 0");
            }
            if self.durable.max_bytes == 0 {
                return invalid("durable.max_bytes must be greater than 0");
            }
            if self.durable.max_age_ms == 0 {
                return invalid("durable.max_age_ms must be greater than 0");
            }
            if self.durable.max_entries < self.volatile.max_entries {
                return invalid("durable.max_entries must not be smaller than volatile.max_entries");
            }
        }

        if self.promotion.min_access_count == 0 {
            return invalid("promotion.min_access_count must be greater than 0");
        }
        if self.metrics.max_events == 0 {
            return invalid("metrics.max_events must be greater than 0");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty" | "compact") {
            return invalid("logging.format must be one of json, pretty, compact");
        }

        Ok(())
    }

    pub fn volatile_ttl(&self) -> Duration {
        Duration::from_millis(self.volatile.max_age_ms)
    }

    pub fn durable_ttl(&self) -> Duration {
        Duration::from_millis(self.durable.max_age_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.durable.sync_interval_ms > 0).then(|| Duration::from_millis(self.durable.sync_interval_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync.retry_delay_ms)
    }

    pub fn promotion_window(&self) -> Duration {
        Duration::from_millis(self.promotion.recent_window_ms)
    }

    /// Whether the periodic sync task should run
    pub fn periodic_sync_enabled(&self) -> bool {
        self.sync.enabled && self.durable.enabled && self.sync_interval().is_some()
    }
}
