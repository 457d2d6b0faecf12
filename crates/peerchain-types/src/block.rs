use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::BlockHash;

/// A block that carries only its position and predecessor, before any payload
/// has been hashed into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStub {
    index: u64,
    prev_hash: BlockHash,
}

impl BlockStub {
    pub fn new(index: u64, prev_hash: BlockHash) -> Self {
        Self { index, prev_hash }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn prev_hash(&self) -> BlockHash {
        self.prev_hash
    }

    /// Fill in the payload and compute the hash.
    pub fn update(self, data: impl Into<Vec<u8>>) -> Block {
        let data = data.into();
        let hash = Block::compute_hash(self.index, &self.prev_hash, &data);
        Block {
            index: self.index,
            prev_hash: self.prev_hash,
            hash,
            data,
        }
    }
}

/// One hash-linked unit of the ledger.
///
/// The hash is `SHA3-256(index ∥ hex(prev_hash) ∥ hex(data))` over the
/// decimal index and lowercase hex strings. Peers must agree on this exact
/// concatenation to interoperate.
///
/// Blocks decoded from storage or the wire keep the hash they arrived with;
/// [`Block::verify`] recomputes it on demand.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlockRecord", into = "BlockRecord")]
pub struct Block {
    index: u64,
    prev_hash: BlockHash,
    hash: BlockHash,
    data: Vec<u8>,
}

impl Block {
    /// Build and hash a block in one step.
    pub fn new(index: u64, prev_hash: BlockHash, data: impl Into<Vec<u8>>) -> Self {
        BlockStub::new(index, prev_hash).update(data)
    }

    /// Rebuild a block from stored or received fields.
    ///
    /// Data without a hash is a corrupt record. A record without data is a
    /// placeholder and cannot stand in for a full block.
    pub fn reconstruct(
        index: u64,
        prev_hash: BlockHash,
        hash: Option<BlockHash>,
        data: Option<Vec<u8>>,
    ) -> Result<Self, TypeError> {
        match (hash, data) {
            (Some(hash), Some(data)) => Ok(Self {
                index,
                prev_hash,
                hash,
                data,
            }),
            (None, Some(_)) => Err(TypeError::MissingHash { index }),
            (_, None) => Err(TypeError::MissingData { index }),
        }
    }

    pub fn compute_hash(index: u64, prev_hash: &BlockHash, data: &[u8]) -> BlockHash {
        let preimage = format!("{index}{}{}", prev_hash.to_hex(), hex::encode(data));
        BlockHash::digest(preimage.as_bytes())
    }

    /// Replace the payload and recompute the hash.
    pub fn update(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.data = data.into();
        self.hash = Self::compute_hash(self.index, &self.prev_hash, &self.data);
        self
    }

    /// Returns `true` if the carried hash matches the recomputed digest.
    pub fn verify(&self) -> bool {
        Self::compute_hash(self.index, &self.prev_hash, &self.data) == self.hash
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn prev_hash(&self) -> BlockHash {
        self.prev_hash
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload as UTF-8, replacing invalid sequences.
    pub fn data_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("prev_hash", &self.prev_hash)
            .field("hash", &self.hash)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Serialized shape shared by storage and the wire: `{index, prevHash, hash, data}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRecord {
    index: u64,
    prev_hash: BlockHash,
    #[serde(default)]
    hash: Option<BlockHash>,
    #[serde(default)]
    data: Option<Vec<u8>>,
}

impl TryFrom<BlockRecord> for Block {
    type Error = TypeError;

    fn try_from(record: BlockRecord) -> Result<Self, Self::Error> {
        Block::reconstruct(record.index, record.prev_hash, record.hash, record.data)
    }
}

impl From<Block> for BlockRecord {
    fn from(block: Block) -> Self {
        Self {
            index: block.index,
            prev_hash: block.prev_hash,
            hash: Some(block.hash),
            data: Some(block.data),
        }
    }
}
