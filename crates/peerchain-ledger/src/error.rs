use peerchain_protocol::ProtocolError;
use peerchain_store::StoreError;
use peerchain_types::{BlockHash, ChainPointer};

use crate::stream::StreamId;

/// Invariant violations in chain and cursor operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("invalid index, expected {expected} got {actual}")]
    InvalidIndex { expected: u64, actual: u64 },

    #[error("invalid previous hash, expected {expected} got {actual}")]
    InvalidPrevHash {
        expected: BlockHash,
        actual: BlockHash,
    },

    #[error("tip #{tip} is below confirmed head {head}")]
    TipBehind { tip: u64, head: ChainPointer },

    #[error("fork tip #{tip} is not ahead of {base}")]
    ForkNotAhead { tip: u64, base: ChainPointer },

    #[error("invalid rebase block {actual}, expected {expected}")]
    InvalidRebase {
        expected: ChainPointer,
        actual: ChainPointer,
    },

    #[error("lineage does not share genesis {0}")]
    ForeignGenesis(BlockHash),

    #[error("chain is already initialized at {0}")]
    AlreadyInitialized(ChainPointer),
}

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("block {0} missing from local storage")]
    MissingBlock(BlockHash),

    #[error("stream {0} is closed")]
    StreamClosed(StreamId),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
