use std::fmt;

use peerchain_types::{Block, BlockHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// The fixed command vocabulary.
///
/// `Blocks` and `GetBlocks` are reserved for batched transfer. They decode,
/// but nothing emits or handles them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Head,
    GetHead,
    Block,
    GetBlock,
    Blocks,
    GetBlocks,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Head,
        Command::GetHead,
        Command::Block,
        Command::GetBlock,
        Command::Blocks,
        Command::GetBlocks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::GetHead => "gethead",
            Self::Block => "block",
            Self::GetBlock => "getblock",
            Self::Blocks => "blocks",
            Self::GetBlocks => "getblocks",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }

    /// One-byte tag used in frame headers.
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Head => 1,
            Self::GetHead => 2,
            Self::Block => 3,
            Self::GetBlock => 4,
            Self::Blocks => 5,
            Self::GetBlocks => 6,
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Blocks | Self::GetBlocks)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message exchanged between peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Announce the sender's current tip.
    Head(Block),
    /// Ask a peer for its current tip.
    GetHead,
    /// Deliver a requested block.
    Block(Block),
    /// Ask a peer for the block with this hash.
    GetBlock(BlockHash),
    /// A reserved command arrived.
    Reserved(Command),
    /// A command outside the vocabulary arrived.
    Unrecognized { command: String },
}

/// Frame tag for messages without a known command.
pub const UNRECOGNIZED_TAG: u8 = 0xFF;

impl Message {
    pub fn command(&self) -> Option<Command> {
        match self {
            Self::Head(_) => Some(Command::Head),
            Self::GetHead => Some(Command::GetHead),
            Self::Block(_) => Some(Command::Block),
            Self::GetBlock(_) => Some(Command::GetBlock),
            Self::Reserved(command) => Some(*command),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Command tag as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Self::Unrecognized { command } => command,
            other => other.command().map_or("", |c| c.as_str()),
        }
    }

    pub fn type_tag(&self) -> u8 {
        self.command().map_or(UNRECOGNIZED_TAG, |c| c.type_tag())
    }

    pub fn to_envelope(&self) -> ProtocolResult<Envelope> {
        let payload = match self {
            Self::Head(block) | Self::Block(block) => serde_json::to_value(block)
                .map_err(|e| ProtocolError::Serialization(e.to_string()))?,
            Self::GetBlock(hash) => Value::String(hash.to_hex()),
            Self::GetHead | Self::Reserved(_) | Self::Unrecognized { .. } => Value::Null,
        };
        Ok(Envelope {
            command: self.name().to_owned(),
            payload,
        })
    }

    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Self> {
        let Envelope { command, payload } = envelope;
        let Some(parsed) = Command::parse(&command) else {
            return Ok(Self::Unrecognized { command });
        };
        let invalid = |reason: String| ProtocolError::InvalidPayload {
            command: command.clone(),
            reason,
        };
        match parsed {
            Command::Head => serde_json::from_value(payload)
                .map(Self::Head)
                .map_err(|e| invalid(e.to_string())),
            Command::Block => serde_json::from_value(payload)
                .map(Self::Block)
                .map_err(|e| invalid(e.to_string())),
            Command::GetBlock => serde_json::from_value(payload)
                .map(Self::GetBlock)
                .map_err(|e| invalid(e.to_string())),
            Command::GetHead => Ok(Self::GetHead),
            Command::Blocks | Command::GetBlocks => Ok(Self::Reserved(parsed)),
        }
    }
}

/// JSON shape of a message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}
