//! Durable storage adapters
//!
//! The durable tier delegates persistence to a [`StorageBackend`]. The cache
//! depends on the backend but never owns the storage behind it.
//!
//! - [`InMemoryStorage`]: process-local map, with failure injection
//! - [`FileStorage`]: one file per key under a directory

use crate::core::error::Result;
use crate::core::types::CacheEntry;
use async_trait::async_trait;

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

/// Durable key-value store consumed by the tier manager.
///
/// Every operation is fallible; the cache absorbs failures and degrades to
/// volatile-only behaviour.
#[async_trait]
pub trait StorageBackend<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Short identifier used in logs
    fn name(&self) -> &str;

    async fn load(&self, key: &str) -> Result<Option<CacheEntry<V>>>;

    async fn save(&self, entry: &CacheEntry<V>) -> Result<()>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Push buffered writes down to the medium
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
