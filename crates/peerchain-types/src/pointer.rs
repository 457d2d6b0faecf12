use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::hash::BlockHash;

/// A position in a chain: the index and hash of one block.
///
/// `index == None` is the origin, the slot before genesis whose hash is
/// [`BlockHash::zero`]. An uninitialized chain points at the origin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainPointer {
    pub index: Option<u64>,
    pub hash: BlockHash,
}

impl ChainPointer {
    pub const fn origin() -> Self {
        Self {
            index: None,
            hash: BlockHash::zero(),
        }
    }

    pub fn new(index: u64, hash: BlockHash) -> Self {
        Self {
            index: Some(index),
            hash,
        }
    }

    /// Pointer at `block` itself.
    pub fn of(block: &Block) -> Self {
        Self::new(block.index(), block.hash())
    }

    /// Pointer at the predecessor of `block`.
    pub fn parent_of(block: &Block) -> Self {
        Self {
            index: block.index().checked_sub(1),
            hash: block.prev_hash(),
        }
    }

    pub fn is_origin(&self) -> bool {
        self.index.is_none()
    }

    /// Index the block after this position would take.
    pub fn next_index(&self) -> u64 {
        self.index.map_or(0, |i| i + 1)
    }

    /// Returns `true` if this position is strictly below `index`.
    pub fn is_below(&self, index: u64) -> bool {
        self.index < Some(index)
    }

    /// Returns `true` if this pointer names exactly `block`.
    pub fn points_at(&self, block: &Block) -> bool {
        self.index == Some(block.index()) && self.hash == block.hash()
    }
}

impl Default for ChainPointer {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Debug for ChainPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainPointer({self})")
    }
}

impl fmt::Display for ChainPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "#{index}:{}", self.hash.short_hex()),
            None => write!(f, "origin"),
        }
    }
}
