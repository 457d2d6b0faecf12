use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Envelope, Message};

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for framing protocol messages on a byte pipe.
pub struct PeerCodec;

impl PeerCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][JSON envelope]
    pub fn encode(msg: &Message) -> ProtocolResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(Message, usize)> {
        if data.len() < 5 {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = Self::frame_len([data[0], data[1], data[2], data[3]])?;
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let msg = Self::decode_body(data[4], &data[5..total])?;
        Ok((msg, total))
    }

    /// Encode the JSON envelope only (no framing).
    pub fn encode_payload(msg: &Message) -> ProtocolResult<Vec<u8>> {
        let envelope = msg.to_envelope()?;
        serde_json::to_vec(&envelope).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a JSON envelope (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<Message> {
        let envelope: Envelope = serde_json::from_slice(data)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Message::from_envelope(envelope)
    }

    fn frame_len(header: [u8; 4]) -> ProtocolResult<usize> {
        let len = u32::from_be_bytes(header) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len - 1,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(len)
    }

    fn decode_body(tag: u8, payload: &[u8]) -> ProtocolResult<Message> {
        let msg = Self::decode_payload(payload)?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::FramingError(format!(
                "tag {tag} does not match command {:?}",
                msg.name()
            )));
        }
        Ok(msg)
    }
}

/// Write one framed message.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = PeerCodec::encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = PeerCodec::frame_len(header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let msg = PeerCodec::decode_body(body[0], &body[1..])?;
    trace!(command = msg.name(), len, "frame read");
    Ok(Some(msg))
}
