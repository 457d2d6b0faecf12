//! Foundation types for Peerchain.
//!
//! Every other Peerchain crate depends on `peerchain-types`.
//!
//! # Key Types
//!
//! - [`BlockHash`] -- SHA3-256 digest identifying a block
//! - [`Block`] -- immutable, hash-linked unit of the ledger
//! - [`BlockStub`] -- placeholder carrying only index and predecessor hash
//! - [`ChainPointer`] -- an `{index, hash}` position in a chain

pub mod block;
pub mod error;
pub mod hash;
pub mod pointer;

pub use block::{Block, BlockStub};
pub use error::TypeError;
pub use hash::BlockHash;
pub use pointer::ChainPointer;
