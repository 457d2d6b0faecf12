//! Gossip protocol for Peerchain.
//!
//! Peers exchange [`Message`]s: a command tag plus an optional payload. On a
//! byte pipe each message travels as a JSON [`Envelope`]
//! `{"command": ..., "payload": ...}` inside a length-prefixed frame
//! produced by [`PeerCodec`].

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{read_frame, write_frame, PeerCodec, MAX_FRAME_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Command, Envelope, Message};
