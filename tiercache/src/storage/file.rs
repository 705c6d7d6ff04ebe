//! File storage backend
//!
//! Persistent disk-backed durable tier. Each entry lives in its own file
//! named after the SHA-256 of its key; writes go to a temp file first and
//! are renamed into place.

use super::StorageBackend;
use crate::compression::{CodecPipeline, PayloadCodec};
use crate::config::DurableConfig;
use crate::core::error::{CacheError, Result};
use crate::core::types::CacheEntry;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const ENTRY_EXT: &str = "entry";

pub struct FileStorage<V> {
    directory: PathBuf,
    codec: Arc<dyn PayloadCodec>,
    _value: PhantomData<fn() -> V>,
}

impl<V> FileStorage<V> {
    /// Create or open a storage directory
    pub fn new(directory: impl Into<PathBuf>, codec: Arc<dyn PayloadCodec>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        debug!(
            "Opened file storage at {:?} (codec={})",
            directory,
            codec.name()
        );

        Ok(Self {
            directory,
            codec,
            _value: PhantomData,
        })
    }

    /// Open with the codec pipeline selected by the durable config
    pub fn from_config(directory: impl Into<PathBuf>, config: &DurableConfig) -> Result<Self> {
        Self::new(directory, Arc::new(CodecPipeline::from_config(config)))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let name = hex::encode(hasher.finalize());
        self.directory.join(format!("{}.{}", name, ENTRY_EXT))
    }
}

#[async_trait]
impl<V> StorageBackend<V> for FileStorage<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload = self.codec.decode(raw)?;
        let entry: CacheEntry<V> = serde_json::from_slice(&payload).map_err(|e| {
            warn!("Corrupted entry file {:?}: {}", path, e);
            CacheError::Io(format!("corrupted entry for {}: {}", key, e))
        })?;

        // Hash collisions are not expected, but never hand back another key
        if entry.key != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn save(&self, entry: &CacheEntry<V>) -> Result<()> {
        let payload = serde_json::to_vec(entry)?;
        let encoded = self.codec.encode(payload)?;

        let path = self.entry_path(&entry.key);
        // Concurrent saves of one key each get their own temp file
        let tmp = path.with_extension(format!("{}.{}.tmp", ENTRY_EXT, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("File storage SAVE: {} ({} bytes)", entry.key, encoded.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = tokio::fs::read_dir(&self.directory).await?;
        let mut removed = 0usize;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_entry = path
                .extension()
                .is_some_and(|ext| ext == ENTRY_EXT || ext == "tmp");
            if is_entry {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        debug!("File storage CLEAR ({} files)", removed);
        Ok(())
    }
}
