//! Ledger core for Peerchain.
//!
//! A [`Ledger`] keeps a hash-linked chain of blocks and converges with its
//! peers by gossip. Local appends announce the new head to every stream.
//! A head that extends the canonical chain is appended directly; a head from
//! a different lineage becomes a pending fork.
//!
//! # Reconciliation
//!
//! A fork is a [`ReconciliationCursor`] seeded at the canonical head and
//! tipped at the conflicting block. The cursor walks the fork's lineage
//! backwards through locally stored blocks. When the walk lands on a block
//! the canonical chain already holds at that position, it rebases onto it and
//! keeps going. When the walk needs a block that is not stored, the fork is
//! suspended on that hash in the [`ForkSet`] and the block is requested with
//! `getblock`; the matching `block` message resumes it.
//!
//! Once the walk reconnects, the fork leaves the pending set and replaces the
//! canonical chain only if its head index is strictly greater.
//!
//! # Streams
//!
//! [`Ledger::create_stream`] hands out a [`PeerStream`]. Join two ledgers
//! in-process with [`pipe`], or carry a stream over any byte pipe with
//! [`attach_io`].

pub mod audit;
pub mod chain;
pub mod config;
pub mod error;
pub mod fork;
pub mod ledger;
pub mod stream;
pub mod transport;

pub use audit::{verify_lineage, walk_back, LineageReport};
pub use chain::Chain;
pub use config::LedgerConfig;
pub use error::{ChainError, LedgerError, LedgerResult};
pub use fork::{Fork, ForkId, ForkSet, ReconciliationCursor};
pub use ledger::Ledger;
pub use stream::{pipe, Link, PeerStream, StreamId, StreamSink, StreamSource};
pub use transport::{attach_io, serve_io};
