//! In-process peer streams and the registry a ledger broadcasts through.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use peerchain_protocol::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{LedgerError, LedgerResult};

/// Identity of a stream, unique within the ledger that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Event delivered to a ledger's dispatch loop.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message { stream: StreamId, message: Message },
    Closed(StreamId),
}

/// A ledger's end of one peer connection.
///
/// Messages the peer sends are [`push`](Self::push)ed into the ledger;
/// messages the ledger sends to the peer come out of [`recv`](Self::recv).
/// Dropping the stream (or either half after [`split`](Self::split))
/// deregisters it from the ledger.
#[derive(Debug)]
pub struct PeerStream {
    sink: StreamSink,
    source: StreamSource,
}

impl PeerStream {
    pub fn id(&self) -> StreamId {
        self.sink.id
    }

    /// Deliver a message received from the peer.
    pub fn push(&self, message: Message) -> LedgerResult<()> {
        self.sink.push(message)
    }

    /// Next message the ledger has for the peer. `None` once deregistered.
    pub async fn recv(&mut self) -> Option<Message> {
        self.source.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.source.try_recv()
    }

    pub fn split(self) -> (StreamSink, StreamSource) {
        (self.sink, self.source)
    }

    pub fn close(self) {
        debug!(stream = %self.id(), "closing stream");
    }
}

/// Inbound half: feeds peer messages to the ledger.
#[derive(Debug)]
pub struct StreamSink {
    id: StreamId,
    inbox: mpsc::UnboundedSender<Inbound>,
}

impl StreamSink {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn push(&self, message: Message) -> LedgerResult<()> {
        self.inbox
            .send(Inbound::Message {
                stream: self.id,
                message,
            })
            .map_err(|_| LedgerError::StreamClosed(self.id))
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        // The ledger may already be gone.
        let _ = self.inbox.send(Inbound::Closed(self.id));
    }
}

/// Outbound half: yields messages the ledger sends to the peer.
#[derive(Debug)]
pub struct StreamSource {
    id: StreamId,
    outbound: mpsc::UnboundedReceiver<Message>,
}

impl StreamSource {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok()
    }
}

/// Active outbound channels, keyed by stream.
#[derive(Debug, Default)]
pub(crate) struct StreamRegistry {
    next_id: AtomicU64,
    streams: RwLock<BTreeMap<StreamId, mpsc::UnboundedSender<Message>>>,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, inbox: mpsc::UnboundedSender<Inbound>) -> PeerStream {
        let id = StreamId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .write()
            .expect("stream registry lock poisoned")
            .insert(id, tx);
        PeerStream {
            sink: StreamSink { id, inbox },
            source: StreamSource { id, outbound: rx },
        }
    }

    pub(crate) fn deregister(&self, id: StreamId) -> bool {
        self.streams
            .write()
            .expect("stream registry lock poisoned")
            .remove(&id)
            .is_some()
    }

    pub(crate) fn contains(&self, id: StreamId) -> bool {
        self.streams
            .read()
            .expect("stream registry lock poisoned")
            .contains_key(&id)
    }

    /// Push to one stream. A stream whose receiver is gone is deregistered.
    pub(crate) fn send(&self, id: StreamId, message: Message) -> bool {
        let mut streams = self.streams.write().expect("stream registry lock poisoned");
        let Some(tx) = streams.get(&id) else {
            return false;
        };
        if tx.send(message).is_ok() {
            return true;
        }
        streams.remove(&id);
        debug!(stream = %id, "dropped closed stream on send");
        false
    }

    /// Push to every stream except `except`. Returns the number delivered.
    pub(crate) fn broadcast(&self, message: &Message, except: Option<StreamId>) -> usize {
        let mut delivered = 0;
        let mut streams = self.streams.write().expect("stream registry lock poisoned");
        streams.retain(|id, tx| {
            if Some(*id) == except {
                return !tx.is_closed();
            }
            let ok = tx.send(message.clone()).is_ok();
            if ok {
                delivered += 1;
            } else {
                debug!(stream = %id, "dropped closed stream on broadcast");
            }
            ok
        });
        trace!(command = message.name(), delivered, "broadcast");
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        self.streams
            .read()
            .expect("stream registry lock poisoned")
            .len()
    }
}

/// Two streams forwarding into each other.
#[derive(Debug)]
pub struct Link {
    forward: JoinHandle<()>,
    backward: JoinHandle<()>,
}

impl Link {
    /// Stop forwarding. Both streams are dropped and deregister from their ledgers.
    pub fn close(self) {
        self.forward.abort();
        self.backward.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.forward.is_finished() && self.backward.is_finished()
    }
}

/// Join two streams so each one's outbound messages reach the other's ledger.
///
/// Must be called within a Tokio runtime.
pub fn pipe(a: PeerStream, b: PeerStream) -> Link {
    let (a_sink, a_source) = a.split();
    let (b_sink, b_source) = b.split();
    Link {
        forward: tokio::spawn(forward(a_source, b_sink)),
        backward: tokio::spawn(forward(b_source, a_sink)),
    }
}

async fn forward(mut from: StreamSource, to: StreamSink) {
    while let Some(message) = from.recv().await {
        if to.push(message).is_err() {
            break;
        }
    }
    debug!(from = %from.id(), to = %to.id(), "link closed");
}
