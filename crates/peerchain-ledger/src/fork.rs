//! Fork candidates and the backward-walking reconciliation cursor.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use peerchain_types::{Block, BlockHash, ChainPointer};

use crate::chain::Chain;
use crate::error::ChainError;
use crate::stream::StreamId;

/// A candidate chain plus the position the walk is trying to locate locally.
///
/// The candidate starts at the canonical head the fork was seeded from, with
/// its tip at the conflicting block. Each [`check`](Self::check) moves the
/// walk one block down the candidate's lineage. The candidate is verified once
/// the walk lands on the candidate's confirmed head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationCursor {
    candidate: Chain,
    check: ChainPointer,
}

impl ReconciliationCursor {
    /// Seed a cursor at `base` with `tip` announced above it.
    pub fn new(base: ChainPointer, tip: &Block) -> Result<Self, ChainError> {
        if !base.is_below(tip.index()) {
            return Err(ChainError::ForkNotAhead {
                tip: tip.index(),
                base,
            });
        }
        let mut candidate = Chain::from_pointer(base);
        candidate.tip(tip)?;
        Ok(Self {
            candidate,
            check: ChainPointer::parent_of(tip),
        })
    }

    pub fn candidate(&self) -> &Chain {
        &self.candidate
    }

    /// Position the walk is looking for.
    pub fn check_pointer(&self) -> ChainPointer {
        self.check
    }

    pub fn check_hash(&self) -> BlockHash {
        self.check.hash
    }

    /// Step the walk past `block` to its predecessor.
    ///
    /// Returns the candidate's confirmed hash when `block` sits at the
    /// confirmed index with a different hash: the caller must rebase onto the
    /// locally known block at that position.
    pub fn check(&mut self, block: &Block) -> Option<BlockHash> {
        self.check = ChainPointer::parent_of(block);
        let head = self.candidate.head();
        if head.index == Some(block.index()) && head.hash != block.hash() {
            return Some(head.hash);
        }
        None
    }

    /// Move the candidate's confirmed head one step down past `block`, which
    /// must be exactly the confirmed block.
    pub fn rebase(&mut self, block: &Block) -> Result<(), ChainError> {
        let head = self.candidate.head();
        if !head.points_at(block) {
            return Err(ChainError::InvalidRebase {
                expected: head,
                actual: ChainPointer::of(block),
            });
        }
        if block.is_genesis() {
            return Err(ChainError::ForeignGenesis(block.hash()));
        }
        self.candidate.step_back(block);
        Ok(())
    }

    /// Returns `true` once the walk has reached the confirmed head, and
    /// confirms the announced tip when it does.
    pub fn is_valid(&mut self) -> bool {
        let valid = self.check.hash == self.candidate.hash();
        if valid && self.candidate.tip_pointer().hash != self.candidate.hash() {
            self.candidate.confirm_tip();
            self.check = self.candidate.head();
        }
        valid
    }

    pub fn into_chain(self) -> Chain {
        self.candidate
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForkId(u64);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A pending fork under reconciliation.
#[derive(Debug)]
pub struct Fork {
    pub id: ForkId,
    pub cursor: ReconciliationCursor,
    /// Stream that announced the conflicting head.
    pub origin: Option<StreamId>,
    pub last_progress: Instant,
    /// Block this fork is suspended on.
    awaiting: Option<BlockHash>,
}

impl Fork {
    pub fn tip(&self) -> ChainPointer {
        self.cursor.candidate().tip_pointer()
    }

    pub fn awaiting(&self) -> Option<BlockHash> {
        self.awaiting
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_progress = now;
    }
}

/// Pending forks, indexed by the block each one is waiting for.
#[derive(Debug)]
pub struct ForkSet {
    forks: BTreeMap<ForkId, Fork>,
    waiting: HashMap<BlockHash, Vec<ForkId>>,
    next_id: u64,
    max_pending: usize,
}

impl ForkSet {
    pub fn new(max_pending: usize) -> Self {
        Self {
            forks: BTreeMap::new(),
            waiting: HashMap::new(),
            next_id: 0,
            max_pending: max_pending.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.forks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forks.is_empty()
    }

    pub fn get(&self, id: ForkId) -> Option<&Fork> {
        self.forks.get(&id)
    }

    pub fn get_mut(&mut self, id: ForkId) -> Option<&mut Fork> {
        self.forks.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fork> {
        self.forks.values()
    }

    /// Fork already tracking exactly this tip.
    pub fn find_by_tip(&self, tip: &ChainPointer) -> Option<ForkId> {
        self.forks
            .values()
            .find(|fork| fork.tip() == *tip)
            .map(|fork| fork.id)
    }

    /// Track a new fork. Returns its id and the fork evicted to make room, if any.
    pub fn insert(
        &mut self,
        cursor: ReconciliationCursor,
        origin: Option<StreamId>,
        now: Instant,
    ) -> (ForkId, Option<Fork>) {
        let evicted = if self.forks.len() >= self.max_pending {
            self.stalest().and_then(|id| self.remove(id))
        } else {
            None
        };

        let id = ForkId(self.next_id);
        self.next_id += 1;
        self.forks.insert(
            id,
            Fork {
                id,
                cursor,
                origin,
                last_progress: now,
                awaiting: None,
            },
        );
        (id, evicted)
    }

    pub fn remove(&mut self, id: ForkId) -> Option<Fork> {
        let fork = self.forks.remove(&id)?;
        if let Some(hash) = fork.awaiting {
            self.unregister(id, hash);
        }
        Some(fork)
    }

    /// Suspend `id` until a block with `hash` arrives.
    pub fn await_block(&mut self, id: ForkId, hash: BlockHash) {
        let Some(fork) = self.forks.get_mut(&id) else {
            return;
        };
        let previous = fork.awaiting.replace(hash);
        if let Some(previous) = previous {
            self.unregister(id, previous);
        }
        let ids = self.waiting.entry(hash).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Forks waiting for `hash`; they are no longer registered as waiting.
    pub fn take_waiting(&mut self, hash: &BlockHash) -> Vec<ForkId> {
        let ids = self.waiting.remove(hash).unwrap_or_default();
        for id in &ids {
            if let Some(fork) = self.forks.get_mut(id) {
                fork.awaiting = None;
            }
        }
        ids
    }

    /// Remove forks that made no progress within `ttl`.
    pub fn prune_stale(&mut self, ttl: Duration, now: Instant) -> Vec<Fork> {
        let expired: Vec<ForkId> = self
            .forks
            .values()
            .filter(|fork| now.saturating_duration_since(fork.last_progress) >= ttl)
            .map(|fork| fork.id)
            .collect();
        expired.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    fn stalest(&self) -> Option<ForkId> {
        self.forks
            .values()
            .min_by_key(|fork| fork.last_progress)
            .map(|fork| fork.id)
    }

    fn unregister(&mut self, id: ForkId, hash: BlockHash) {
        if let Some(ids) = self.waiting.get_mut(&hash) {
            ids.retain(|waiting| *waiting != id);
            if ids.is_empty() {
                self.waiting.remove(&hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `len` blocks on top of genesis, all payloads prefixed with `tag`.
    fn lineage(genesis: &Block, tag: &str, len: usize) -> Vec<Block> {
        let mut chain = Chain::from_pointer(ChainPointer::of(genesis));
        (0..len)
            .map(|i| chain.append_data(format!("{tag}{i}")))
            .collect()
    }

    fn genesis() -> Block {
        Chain::new().init("").unwrap()
    }

    #[test]
    fn new_cursor_points_below_tip() {
        let g = genesis();
        let theirs = lineage(&g, "b", 2);
        let cursor = ReconciliationCursor::new(ChainPointer::of(&g), &theirs[1]).unwrap();
        assert_eq!(cursor.check_pointer(), ChainPointer::of(&theirs[0]));
        assert_eq!(cursor.candidate().head(), ChainPointer::of(&g));
        assert_eq!(cursor.candidate().tip_pointer(), ChainPointer::of(&theirs[1]));
    }

    #[test]
    fn seeding_requires_tip_above_base() {
        let g = genesis();
        let ours = lineage(&g, "a", 2);
        let theirs = lineage(&g, "b", 2);
        let err = ReconciliationCursor::new(ChainPointer::of(&ours[1]), &theirs[1]).unwrap_err();
        assert!(matches!(err, ChainError::ForkNotAhead { tip: 2, .. }));
    }

    #[test]
    fn walk_reaches_shared_ancestor() {
        // Canonical at genesis, peer has two blocks on top.
        let g = genesis();
        let theirs = lineage(&g, "b", 2);
        let mut cursor = ReconciliationCursor::new(ChainPointer::of(&g), &theirs[1]).unwrap();
        assert!(!cursor.is_valid());

        assert_eq!(cursor.check(&theirs[0]), None);
        assert!(cursor.is_valid());
        assert_eq!(cursor.candidate().head(), ChainPointer::of(&theirs[1]));
        assert_eq!(cursor.check_pointer(), ChainPointer::of(&theirs[1]));
    }

    #[test]
    fn stale_position_is_rebased() {
        // Canonical a0..a1, peer b0..b2: walk must rebase twice.
        let g = genesis();
        let ours = lineage(&g, "a", 2);
        let theirs = lineage(&g, "b", 3);
        let mut cursor = ReconciliationCursor::new(ChainPointer::of(&ours[1]), &theirs[2]).unwrap();

        assert_eq!(cursor.check(&theirs[1]), Some(ours[1].hash()));
        cursor.rebase(&ours[1]).unwrap();
        assert!(!cursor.is_valid());

        assert_eq!(cursor.check(&theirs[0]), Some(ours[0].hash()));
        cursor.rebase(&ours[0]).unwrap();
        assert!(cursor.is_valid());

        let chain = cursor.into_chain();
        assert_eq!(chain.head(), ChainPointer::of(&theirs[2]));
    }

    #[test]
    fn check_is_idempotent() {
        let g = genesis();
        let ours = lineage(&g, "a", 1);
        let theirs = lineage(&g, "b", 2);
        let mut cursor = ReconciliationCursor::new(ChainPointer::of(&ours[0]), &theirs[1]).unwrap();

        let first = cursor.check(&theirs[0]);
        let after_first = cursor.check_pointer();
        let second = cursor.check(&theirs[0]);
        assert_eq!(first, second);
        assert_eq!(cursor.check_pointer(), after_first);
        assert_eq!(after_first, ChainPointer::of(&g));
    }

    #[test]
    fn rebase_requires_confirmed_block() {
        let g = genesis();
        let ours = lineage(&g, "a", 1);
        let theirs = lineage(&g, "b", 2);
        let mut cursor = ReconciliationCursor::new(ChainPointer::of(&ours[0]), &theirs[1]).unwrap();
        let err = cursor.rebase(&theirs[0]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidRebase { .. }));
        assert_eq!(cursor.candidate().head(), ChainPointer::of(&ours[0]));
    }

    #[test]
    fn rebasing_past_genesis_is_refused() {
        let g = genesis();
        let foreign = Block::new(0, BlockHash::digest(b"elsewhere"), "");
        let theirs = Block::new(1, foreign.hash(), "x");
        let mut cursor = ReconciliationCursor::new(ChainPointer::of(&g), &theirs).unwrap();
        assert!(!cursor.is_valid());
        assert_eq!(cursor.check(&foreign), Some(g.hash()));
        assert_eq!(cursor.rebase(&g), Err(ChainError::ForeignGenesis(g.hash())));
    }

    fn cursor_for(tag: &str) -> ReconciliationCursor {
        let g = genesis();
        let theirs = lineage(&g, tag, 3);
        ReconciliationCursor::new(ChainPointer::of(&g), &theirs[2]).unwrap()
    }

    #[test]
    fn fork_set_dedups_by_tip() {
        let mut forks = ForkSet::new(8);
        let cursor = cursor_for("b");
        let tip = cursor.candidate().tip_pointer();
        let (id, evicted) = forks.insert(cursor, None, Instant::now());
        assert!(evicted.is_none());
        assert_eq!(forks.find_by_tip(&tip), Some(id));
        assert_eq!(forks.find_by_tip(&ChainPointer::origin()), None);
    }

    #[test]
    fn waiting_index_tracks_suspended_forks() {
        let mut forks = ForkSet::new(8);
        let now = Instant::now();
        let (a, _) = forks.insert(cursor_for("a"), None, now);
        let (b, _) = forks.insert(cursor_for("b"), None, now);
        let wanted = BlockHash::digest(b"wanted");

        forks.await_block(a, wanted);
        forks.await_block(b, wanted);
        assert_eq!(forks.get(a).unwrap().awaiting(), Some(wanted));

        let mut ids = forks.take_waiting(&wanted);
        ids.sort();
        assert_eq!(ids, vec![a, b]);
        assert!(forks.take_waiting(&wanted).is_empty());
        assert_eq!(forks.get(a).unwrap().awaiting(), None);
    }

    #[test]
    fn re_awaiting_replaces_previous_registration() {
        let mut forks = ForkSet::new(8);
        let (id, _) = forks.insert(cursor_for("a"), None, Instant::now());
        let first = BlockHash::digest(b"first");
        let second = BlockHash::digest(b"second");
        forks.await_block(id, first);
        forks.await_block(id, second);
        assert!(forks.take_waiting(&first).is_empty());
        assert_eq!(forks.take_waiting(&second), vec![id]);
    }

    #[test]
    fn remove_unregisters_waiting() {
        let mut forks = ForkSet::new(8);
        let (id, _) = forks.insert(cursor_for("a"), None, Instant::now());
        let wanted = BlockHash::digest(b"w");
        forks.await_block(id, wanted);
        assert!(forks.remove(id).is_some());
        assert!(forks.take_waiting(&wanted).is_empty());
        assert!(forks.is_empty());
    }

    #[test]
    fn insert_beyond_capacity_evicts_stalest() {
        let mut forks = ForkSet::new(2);
        let start = Instant::now();
        let (old, _) = forks.insert(cursor_for("a"), None, start);
        let (newer, _) = forks.insert(cursor_for("b"), None, start + Duration::from_secs(1));
        let (_, evicted) = forks.insert(cursor_for("c"), None, start + Duration::from_secs(2));

        assert_eq!(evicted.map(|f| f.id), Some(old));
        assert_eq!(forks.len(), 2);
        assert!(forks.get(newer).is_some());
    }

    #[test]
    fn prune_stale_respects_progress() {
        let mut forks = ForkSet::new(8);
        let start = Instant::now();
        let (idle, _) = forks.insert(cursor_for("a"), None, start);
        let (busy, _) = forks.insert(cursor_for("b"), None, start);
        forks.get_mut(busy).unwrap().touch(start + Duration::from_secs(50));

        let pruned = forks.prune_stale(Duration::from_secs(60), start + Duration::from_secs(61));
        assert_eq!(pruned.iter().map(|f| f.id).collect::<Vec<_>>(), vec![idle]);
        assert!(forks.get(busy).is_some());
    }
}
