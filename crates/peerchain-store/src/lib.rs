//! Storage for Peerchain.
//!
//! The ledger treats durable storage as a plain string-keyed key/value store.
//! Two keys are in use: the literal [`STATE_KEY`] holding the canonical
//! `{index, hash}` pointer, and one key per block equal to the block's hex
//! hash.
//!
//! # Storage Backends
//!
//! All backends implement the [`KvStore`] trait:
//!
//! - [`InMemoryKvStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileKvStore`] -- one file per key under a directory
//!
//! [`BlockStore`] layers a bounded LRU cache over any backend. The backend
//! stays the source of truth; the cache only saves reads.
//!
//! # Design Rules
//!
//! 1. Block keys are content-addressed and written once in practice.
//! 2. A missing key is `Ok(None)`, never an error.
//! 3. All I/O errors are propagated, never silently ignored.

pub mod block_store;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use block_store::{BlockStore, STATE_KEY};
pub use error::{StoreError, StoreResult};
pub use file::FileKvStore;
pub use memory::InMemoryKvStore;
pub use traits::KvStore;
