//! Carrying a [`PeerStream`] over a byte pipe.

use peerchain_protocol::{read_frame, write_frame};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::stream::PeerStream;

/// Serve `stream` over `io` until either side closes.
///
/// Outbound messages are framed with the peer codec; inbound frames are
/// decoded and pushed to the ledger. A decode error ends this stream only.
pub async fn serve_io<T>(stream: PeerStream, io: T) -> LedgerResult<()>
where
    T: AsyncRead + AsyncWrite + Send,
{
    let id = stream.id();
    let (mut reader, mut writer) = tokio::io::split(io);
    let (sink, mut source) = stream.split();

    let outbound = async {
        while let Some(message) = source.recv().await {
            write_frame(&mut writer, &message).await?;
        }
        Ok::<_, LedgerError>(())
    };
    let inbound = async {
        while let Some(message) = read_frame(&mut reader).await? {
            sink.push(message)?;
        }
        Ok::<_, LedgerError>(())
    };

    let result = tokio::select! {
        r = outbound => r,
        r = inbound => r,
    };
    match &result {
        Ok(()) => debug!(stream = %id, "transport closed"),
        Err(e) => warn!(stream = %id, error = %e, "transport failed"),
    }
    result
}

/// Spawn [`serve_io`] on the current runtime.
pub fn attach_io<T>(stream: PeerStream, io: T) -> JoinHandle<LedgerResult<()>>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(serve_io(stream, io))
}
