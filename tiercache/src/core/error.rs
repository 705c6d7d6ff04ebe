use thiserror::Error;

/// Main error type for tiercache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Durable backend unreachable. Callers of `get`/`set` never see this;
    /// the facade degrades to volatile-only behaviour instead.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Internal only; lookups surface `None`
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    Checksum { expected: u32, actual: u32 },
}

impl CacheError {
    /// Whether this error originates from the durable backend and must be
    /// absorbed rather than returned to the caller
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Io(_) | Self::Checksum { .. }
        )
    }

    /// Whether this error is caused by caller input or configuration
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::InvalidTtl(_)
                | Self::InvalidPattern(_)
                | Self::SerializationFailure(_)
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationFailure(e.to_string())
    }
}

/// Result type alias for tiercache operations
pub type Result<T> = std::result::Result<T, CacheError>;
