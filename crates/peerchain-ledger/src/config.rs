use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Ledger`](crate::Ledger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Identity of this ledger in logs.
    pub node_id: u16,
    /// Number of blocks held in the LRU cache.
    pub cache_capacity: usize,
    /// A pending fork with no progress for this many seconds is pruned.
    pub fork_ttl_secs: u64,
    /// Upper bound on concurrently pending forks; the stalest is evicted.
    pub max_pending_forks: usize,
    /// Re-announce heads appended from peers to every other stream.
    pub relay_heads: bool,
    /// Drop received blocks whose hash does not recompute.
    pub verify_blocks: bool,
}

impl LedgerConfig {
    pub fn with_node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn fork_ttl(&self) -> Duration {
        Duration::from_secs(self.fork_ttl_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            cache_capacity: 25,
            fork_ttl_secs: 300,
            max_pending_forks: 64,
            relay_heads: false,
            verify_blocks: true,
        }
    }
}
