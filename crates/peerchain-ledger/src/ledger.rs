use std::sync::{Arc, Weak};
use std::time::Instant;

use peerchain_protocol::Message;
use peerchain_store::{BlockStore, KvStore};
use peerchain_types::{Block, BlockHash, ChainPointer};
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::audit::{verify_lineage, walk_back, LineageReport};
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::fork::{ForkId, ForkSet, ReconciliationCursor};
use crate::stream::{Inbound, PeerStream, StreamId, StreamRegistry};

/// Mutable ledger state. Dispatch and local appends take the same lock.
struct LedgerState {
    chain: Chain,
    forks: ForkSet,
}

/// Outcome of walking a fork back through local storage.
enum Walk {
    /// The walk closed on a confirmed block.
    Valid,
    /// The block with this hash is needed to continue.
    Missing(BlockHash),
}

/// A peer in the gossip network.
///
/// Owns the canonical chain, the pending forks, a cached block store and the
/// set of connected streams. Messages from every stream go through one
/// dispatch loop, so handlers run one at a time.
pub struct Ledger {
    id: u16,
    config: LedgerConfig,
    blocks: BlockStore,
    state: Mutex<LedgerState>,
    streams: StreamRegistry,
    inbox: mpsc::UnboundedSender<Inbound>,
    head: watch::Sender<ChainPointer>,
}

impl Ledger {
    /// Create a ledger over `store` and start its dispatch loop.
    ///
    /// The chain stays at the origin until [`init`](Self::init) runs. Must be
    /// called within a Tokio runtime.
    pub fn new(store: Arc<dyn KvStore>, config: LedgerConfig) -> Arc<Self> {
        let (inbox, rx) = mpsc::unbounded_channel();
        let (head, _) = watch::channel(ChainPointer::origin());
        let ledger = Arc::new(Self {
            id: config.node_id,
            blocks: BlockStore::new(store, config.cache_capacity),
            state: Mutex::new(LedgerState {
                chain: Chain::new(),
                forks: ForkSet::new(config.max_pending_forks),
            }),
            streams: StreamRegistry::new(),
            inbox,
            head,
            config,
        });
        tokio::spawn(run_dispatch(Arc::downgrade(&ledger), rx));
        ledger
    }

    /// [`new`](Self::new) followed by [`init`](Self::init).
    pub async fn open(store: Arc<dyn KvStore>, config: LedgerConfig) -> LedgerResult<Arc<Self>> {
        let ledger = Self::new(store, config);
        ledger.init().await?;
        Ok(ledger)
    }

    /// Load the persisted canonical pointer, or create and persist genesis.
    pub async fn init(&self) -> LedgerResult<ChainPointer> {
        let mut state = self.state.lock().await;
        if let Some(pointer) = self.blocks.read_state().await? {
            state.chain = Chain::from_pointer(pointer);
            self.head.send_replace(pointer);
            info!(ledger = self.id, head = %pointer, "ledger loaded");
            return Ok(pointer);
        }

        let mut chain = Chain::new();
        let genesis = chain.init(Vec::new())?;
        self.blocks.put(&genesis).await?;
        self.commit_head(chain.head()).await?;
        state.chain = chain;
        info!(ledger = self.id, hash = %genesis.hash().short_hex(), "genesis created");
        Ok(state.chain.head())
    }

    /// Hash `data` into a new block on the canonical chain and announce it.
    pub async fn append(&self, data: impl Into<Vec<u8>>) -> LedgerResult<Block> {
        let mut state = self.lock_state().await;
        let mut next = state.chain.clone();
        let block = next.append_data(data);
        self.blocks.put(&block).await?;
        self.commit_head(next.head()).await?;
        state.chain = next;
        debug!(ledger = self.id, index = block.index(), hash = %block.hash().short_hex(), "appended");
        self.streams.broadcast(&Message::Head(block.clone()), None);
        Ok(block)
    }

    /// Append a pre-built block that must extend the canonical head, and announce it.
    pub async fn append_block(&self, block: Block) -> LedgerResult<Block> {
        let mut state = self.lock_state().await;
        let mut next = state.chain.clone();
        let block = next.append_block(block)?;
        self.blocks.put(&block).await?;
        self.commit_head(next.head()).await?;
        state.chain = next;
        self.streams.broadcast(&Message::Head(block.clone()), None);
        Ok(block)
    }

    /// Ask every peer for its head. Returns the number of streams reached.
    pub fn sync(&self) -> usize {
        let reached = self.streams.broadcast(&Message::GetHead, None);
        debug!(ledger = self.id, reached, "sync requested");
        reached
    }

    /// Look up a block through the cache. `Ok(None)` when it is not stored.
    pub async fn get(&self, hash: &BlockHash) -> LedgerResult<Option<Block>> {
        Ok(self.blocks.get(hash).await?)
    }

    /// The canonical head block.
    pub async fn head_block(&self) -> LedgerResult<Option<Block>> {
        let head = self.head();
        if head.is_origin() {
            return Ok(None);
        }
        self.get(&head.hash).await
    }

    /// Register a new peer stream.
    pub fn create_stream(&self) -> PeerStream {
        let stream = self.streams.register(self.inbox.clone());
        debug!(ledger = self.id, stream = %stream.id(), "stream created");
        stream
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn head(&self) -> ChainPointer {
        *self.head.borrow()
    }

    pub fn hash(&self) -> BlockHash {
        self.head().hash
    }

    pub fn index(&self) -> Option<u64> {
        self.head().index
    }

    /// Watch the canonical head.
    pub fn subscribe_head(&self) -> watch::Receiver<ChainPointer> {
        self.head.subscribe()
    }

    pub async fn pending_forks(&self) -> usize {
        self.lock_state().await.forks.len()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Canonical blocks from head back to genesis.
    pub async fn history(&self) -> LedgerResult<Vec<Block>> {
        Ok(walk_back(&self.blocks, self.head()).await?)
    }

    /// Audit the stored canonical lineage.
    pub async fn verify(&self) -> LedgerResult<LineageReport> {
        Ok(verify_lineage(&self.blocks, self.head()).await?)
    }

    async fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        let mut state = self.state.lock().await;
        for fork in state.forks.prune_stale(self.config.fork_ttl(), Instant::now()) {
            info!(ledger = self.id, fork = %fork.id, tip = %fork.tip(), "stale fork pruned");
        }
        state
    }

    /// Persist `head` and publish it. The in-memory chain moves only after this succeeds.
    async fn commit_head(&self, head: ChainPointer) -> LedgerResult<()> {
        self.blocks.write_state(&head).await?;
        self.head.send_replace(head);
        Ok(())
    }

    async fn dispatch(&self, stream: StreamId, message: Message) -> LedgerResult<()> {
        debug!(ledger = self.id, stream = %stream, command = message.name(), "IN");
        match message {
            Message::Head(block) => self.on_head(stream, block).await,
            Message::GetHead => self.on_get_head(stream).await,
            Message::Block(block) => self.on_block(stream, block).await,
            Message::GetBlock(hash) => self.on_get_block(stream, hash).await,
            Message::Reserved(command) => {
                debug!(ledger = self.id, stream = %stream, %command, "reserved command dropped");
                Ok(())
            }
            Message::Unrecognized { command } => {
                warn!(ledger = self.id, stream = %stream, command = %command, "unrecognized command dropped");
                Ok(())
            }
        }
    }

    /// Drop received blocks whose hash does not recompute.
    fn accept(&self, stream: StreamId, block: &Block) -> bool {
        if self.config.verify_blocks && !block.verify() {
            warn!(
                ledger = self.id,
                stream = %stream,
                index = block.index(),
                hash = %block.hash().short_hex(),
                "block hash does not recompute, dropped"
            );
            return false;
        }
        true
    }

    async fn on_head(&self, stream: StreamId, block: Block) -> LedgerResult<()> {
        if !self.accept(stream, &block) {
            return Ok(());
        }
        let mut state = self.lock_state().await;
        let base = state.chain.head();
        if !base.is_below(block.index()) {
            trace!(ledger = self.id, index = block.index(), head = %base, "stale head ignored");
            return Ok(());
        }

        let mut next = state.chain.clone();
        match next.append_block(block.clone()) {
            Ok(block) => {
                self.blocks.put(&block).await?;
                self.commit_head(next.head()).await?;
                state.chain = next;
                debug!(ledger = self.id, head = %state.chain.head(), "head appended");
                if self.config.relay_heads {
                    self.streams.broadcast(&Message::Head(block), Some(stream));
                }
                return Ok(());
            }
            Err(e) => debug!(ledger = self.id, error = %e, "head does not extend canonical chain"),
        }

        self.blocks.put(&block).await?;
        let tip = ChainPointer::of(&block);
        let id = match state.forks.find_by_tip(&tip) {
            Some(id) => id,
            None => {
                let cursor = ReconciliationCursor::new(base, &block)?;
                let (id, evicted) = state.forks.insert(cursor, Some(stream), Instant::now());
                if let Some(fork) = evicted {
                    info!(ledger = self.id, fork = %fork.id, tip = %fork.tip(), "pending fork evicted");
                }
                info!(ledger = self.id, fork = %id, %tip, %base, "fork created");
                id
            }
        };
        self.reconcile(&mut state, id, stream).await
    }

    async fn on_get_head(&self, stream: StreamId) -> LedgerResult<()> {
        if let Some(block) = self.head_block().await? {
            self.streams.send(stream, Message::Head(block));
        }
        Ok(())
    }

    async fn on_block(&self, stream: StreamId, block: Block) -> LedgerResult<()> {
        if !self.accept(stream, &block) {
            return Ok(());
        }
        self.blocks.put(&block).await?;

        let mut state = self.lock_state().await;
        let waiting = state.forks.take_waiting(&block.hash());
        if waiting.is_empty() {
            trace!(ledger = self.id, hash = %block.hash().short_hex(), "block stored, no fork waiting");
        }
        let mut first_error = None;
        for id in waiting {
            if let Err(e) = self.reconcile(&mut state, id, stream).await {
                warn!(ledger = self.id, fork = %id, error = %e, "fork reconciliation failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn on_get_block(&self, stream: StreamId, hash: BlockHash) -> LedgerResult<()> {
        match self.get(&hash).await? {
            Some(block) => {
                self.streams.send(stream, Message::Block(block));
            }
            None => trace!(ledger = self.id, hash = %hash.short_hex(), "requested block unknown"),
        }
        Ok(())
    }

    /// Walk fork `id` back through local blocks.
    ///
    /// A verified fork leaves the pending set and replaces the canonical chain
    /// if it is strictly longer. A fork stuck on a missing block is suspended
    /// on that hash and the block is requested.
    async fn reconcile(&self, state: &mut LedgerState, id: ForkId, stream: StreamId) -> LedgerResult<()> {
        let Some(fork) = state.forks.get_mut(id) else {
            return Ok(());
        };
        fork.touch(Instant::now());
        let origin = fork.origin;

        let walk = match self.walk(&mut fork.cursor).await {
            Ok(walk) => walk,
            Err(e) => {
                state.forks.remove(id);
                return Err(e);
            }
        };

        match walk {
            Walk::Valid => {
                let Some(fork) = state.forks.remove(id) else {
                    return Ok(());
                };
                let candidate = fork.cursor.into_chain();
                if candidate.index() > state.chain.index() {
                    self.commit_head(candidate.head()).await?;
                    state.chain = Chain::from_pointer(candidate.head());
                    info!(ledger = self.id, fork = %id, head = %state.chain.head(), "fork adopted");
                } else {
                    debug!(ledger = self.id, fork = %id, tip = %candidate.head(), "fork verified but not longer");
                }
            }
            Walk::Missing(hash) => {
                state.forks.await_block(id, hash);
                let request = Message::GetBlock(hash);
                let target = [origin, Some(stream)]
                    .into_iter()
                    .flatten()
                    .find(|s| self.streams.contains(*s));
                let sent = target.is_some_and(|s| self.streams.send(s, request.clone()));
                if !sent {
                    self.streams.broadcast(&request, None);
                }
                debug!(ledger = self.id, fork = %id, hash = %hash.short_hex(), "requested block");
            }
        }
        Ok(())
    }

    async fn walk(&self, cursor: &mut ReconciliationCursor) -> LedgerResult<Walk> {
        while !cursor.is_valid() {
            let Some(block) = self.blocks.get(&cursor.check_hash()).await? else {
                return Ok(Walk::Missing(cursor.check_hash()));
            };
            if let Some(stale) = cursor.check(&block) {
                let local = self
                    .blocks
                    .get(&stale)
                    .await?
                    .ok_or(LedgerError::MissingBlock(stale))?;
                cursor.rebase(&local)?;
            }
        }
        Ok(Walk::Valid)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("id", &self.id)
            .field("head", &self.head())
            .field("streams", &self.streams.len())
            .finish()
    }
}

async fn run_dispatch(ledger: Weak<Ledger>, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(event) = inbox.recv().await {
        let Some(ledger) = ledger.upgrade() else {
            break;
        };
        match event {
            Inbound::Message { stream, message } => {
                if let Err(e) = ledger.dispatch(stream, message).await {
                    warn!(ledger = ledger.id, stream = %stream, error = %e, "dispatch failed");
                }
            }
            Inbound::Closed(stream) => {
                if ledger.streams.deregister(stream) {
                    debug!(ledger = ledger.id, stream = %stream, "stream closed");
                }
            }
        }
    }
    trace!("dispatch loop stopped");
}
