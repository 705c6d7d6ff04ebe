use super::StorageBackend;
use crate::core::error::{CacheError, Result};
use crate::core::types::CacheEntry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-process storage backend.
///
/// Clones share the same map. `set_available(false)` makes every operation
/// fail with [`CacheError::StorageUnavailable`], which is how outages are
/// simulated.
pub struct InMemoryStorage<V> {
    data: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
    available: Arc<AtomicBool>,
    saves: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl<V: Clone> InMemoryStorage<V> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            saves: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Stored copy, bypassing availability checks
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.data.read().get(key).cloned()
    }

    /// Successful saves so far
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Operations rejected while unavailable
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn check_available(&self, op: &str) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::StorageUnavailable(format!(
                "memory backend offline during {}",
                op
            )))
        }
    }
}

impl<V: Clone> Default for InMemoryStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for InMemoryStorage<V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            available: self.available.clone(),
            saves: self.saves.clone(),
            failures: self.failures.clone(),
        }
    }
}

#[async_trait]
impl<V> StorageBackend<V> for InMemoryStorage<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        self.check_available("load")?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn save(&self, entry: &CacheEntry<V>) -> Result<()> {
        self.check_available("save")?;
        self.data.write().insert(entry.key.clone(), entry.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available("delete")?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_available("clear")?;
        self.data.write().clear();
        Ok(())
    }
}
