use async_trait::async_trait;

use crate::error::StoreResult;

/// String-keyed durable key/value store.
///
/// Implementations must satisfy:
/// - `read` returns the last written value for a key, or `None`.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Delete `key`. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Check whether `key` exists.
    ///
    /// Default implementation reads the value. Backends may override.
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read(key).await?.is_some())
    }
}
