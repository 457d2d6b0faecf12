use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use peerchain_types::{Block, BlockHash, ChainPointer};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::traits::KvStore;

/// Storage key of the canonical chain pointer.
pub const STATE_KEY: &str = "state";

/// Block storage with a bounded LRU cache in front of a [`KvStore`].
///
/// Reads go cache, then backend, then fill the cache. Writes go to both.
/// Least-recently-used blocks are evicted once `capacity` is reached.
pub struct BlockStore {
    backend: Arc<dyn KvStore>,
    cache: Mutex<LruCache<BlockHash, Block>>,
}

impl BlockStore {
    /// Wrap `backend` with a cache of `capacity` blocks (minimum 1).
    pub fn new(backend: Arc<dyn KvStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            backend,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a block by hash. `Ok(None)` when neither tier has it.
    pub async fn get(&self, hash: &BlockHash) -> StoreResult<Option<Block>> {
        let cached = self.cache.lock().expect("lock poisoned").get(hash).cloned();
        if let Some(block) = cached {
            trace!(hash = %hash.short_hex(), "block cache hit");
            return Ok(Some(block));
        }

        let key = hash.to_hex();
        let Some(bytes) = self.backend.read(&key).await? else {
            return Ok(None);
        };
        let block: Block = bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        if block.hash() != *hash {
            return Err(StoreError::Corrupt {
                key,
                reason: format!("value holds block {}", block.hash()),
            });
        }

        self.cache
            .lock()
            .expect("lock poisoned")
            .put(*hash, block.clone());
        Ok(Some(block))
    }

    /// Persist a block under its hash, then cache it.
    pub async fn put(&self, block: &Block) -> StoreResult<()> {
        let bytes =
            bincode::serialize(block).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend.write(&block.hash().to_hex(), bytes).await?;
        self.cache
            .lock()
            .expect("lock poisoned")
            .put(block.hash(), block.clone());
        Ok(())
    }

    /// Read the persisted canonical pointer, if any.
    pub async fn read_state(&self) -> StoreResult<Option<ChainPointer>> {
        let Some(bytes) = self.backend.read(STATE_KEY).await? else {
            return Ok(None);
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: STATE_KEY.into(),
                reason: e.to_string(),
            })
    }

    /// Persist the canonical pointer.
    pub async fn write_state(&self, pointer: &ChainPointer) -> StoreResult<()> {
        let bytes =
            bincode::serialize(pointer).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend.write(STATE_KEY, bytes).await
    }

    /// Returns `true` if the block is currently cached (does not touch recency).
    pub fn is_cached(&self, hash: &BlockHash) -> bool {
        self.cache.lock().expect("lock poisoned").contains(hash)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().expect("lock poisoned").len()
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().expect("lock poisoned").cap().get()
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("cached", &self.cached_len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
