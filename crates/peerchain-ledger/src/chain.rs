use peerchain_types::{Block, BlockHash, BlockStub, ChainPointer};

use crate::error::ChainError;

/// Confirmed head of a chain plus the most recently announced tip.
///
/// The tip never trails the head. A canonical chain keeps them equal; a fork
/// candidate's tip runs ahead until its lineage is verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    head: ChainPointer,
    tip: ChainPointer,
}

impl Chain {
    /// An uninitialized chain at the origin.
    pub fn new() -> Self {
        Self::from_pointer(ChainPointer::origin())
    }

    pub fn from_pointer(pointer: ChainPointer) -> Self {
        Self {
            head: pointer,
            tip: pointer,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.head.is_origin()
    }

    pub fn head(&self) -> ChainPointer {
        self.head
    }

    /// The announced tip.
    pub fn tip_pointer(&self) -> ChainPointer {
        self.tip
    }

    pub fn index(&self) -> Option<u64> {
        self.head.index
    }

    pub fn hash(&self) -> BlockHash {
        self.head.hash
    }

    /// Record an announced tip at or above the confirmed head.
    pub fn tip(&mut self, block: &Block) -> Result<(), ChainError> {
        if self.head.index > Some(block.index()) {
            return Err(ChainError::TipBehind {
                tip: block.index(),
                head: self.head,
            });
        }
        self.tip = ChainPointer::of(block);
        Ok(())
    }

    /// Create the genesis block on an uninitialized chain.
    pub fn init(&mut self, data: impl Into<Vec<u8>>) -> Result<Block, ChainError> {
        if self.is_initialized() {
            return Err(ChainError::AlreadyInitialized(self.head));
        }
        Ok(self.append_data(data))
    }

    /// Hash `data` into the next block and confirm it.
    pub fn append_data(&mut self, data: impl Into<Vec<u8>>) -> Block {
        let block = BlockStub::new(self.head.next_index(), self.head.hash).update(data);
        self.advance(&block);
        block
    }

    /// Confirm a pre-built block that must extend the head exactly.
    pub fn append_block(&mut self, block: Block) -> Result<Block, ChainError> {
        let expected = self.head.next_index();
        if block.index() != expected {
            return Err(ChainError::InvalidIndex {
                expected,
                actual: block.index(),
            });
        }
        if block.prev_hash() != self.head.hash {
            return Err(ChainError::InvalidPrevHash {
                expected: self.head.hash,
                actual: block.prev_hash(),
            });
        }
        self.advance(&block);
        Ok(block)
    }

    fn advance(&mut self, block: &Block) {
        self.head = ChainPointer::of(block);
        if self.tip.is_below(block.index()) {
            self.tip = self.head;
        }
    }

    /// Move the head to the predecessor of `block`.
    pub(crate) fn step_back(&mut self, block: &Block) {
        self.head = ChainPointer::parent_of(block);
    }

    /// Confirm the announced tip.
    pub(crate) fn confirm_tip(&mut self) {
        self.head = self.tip;
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized() -> (Chain, Block) {
        let mut chain = Chain::new();
        let genesis = chain.init("").unwrap();
        (chain, genesis)
    }

    #[test]
    fn new_chain_is_uninitialized() {
        let chain = Chain::new();
        assert!(!chain.is_initialized());
        assert_eq!(chain.index(), None);
        assert!(chain.hash().is_zero());
    }

    #[test]
    fn init_creates_genesis() {
        let (chain, genesis) = initialized();
        assert!(chain.is_initialized());
        assert_eq!(genesis.index(), 0);
        assert!(genesis.prev_hash().is_zero());
        assert_eq!(chain.head(), ChainPointer::of(&genesis));
        assert_eq!(chain.tip_pointer(), chain.head());
    }

    #[test]
    fn init_twice_fails() {
        let (mut chain, genesis) = initialized();
        assert_eq!(
            chain.init(""),
            Err(ChainError::AlreadyInitialized(ChainPointer::of(&genesis)))
        );
    }

    #[test]
    fn append_data_links_to_head() {
        let (mut chain, genesis) = initialized();
        let block = chain.append_data("foo");
        assert_eq!(block.index(), 1);
        assert_eq!(block.prev_hash(), genesis.hash());
        assert_eq!(block.hash(), Block::compute_hash(1, &genesis.hash(), b"foo"));
        assert_eq!(chain.head(), ChainPointer::of(&block));
        assert_eq!(chain.tip_pointer(), chain.head());
    }

    #[test]
    fn append_block_accepts_successor() {
        let (mut chain, genesis) = initialized();
        let next = Block::new(1, genesis.hash(), "foo");
        chain.append_block(next.clone()).unwrap();
        assert_eq!(chain.hash(), next.hash());
    }

    #[test]
    fn append_block_rejects_wrong_index() {
        let (mut chain, genesis) = initialized();
        let err = chain
            .append_block(Block::new(2, genesis.hash(), "foo"))
            .unwrap_err();
        assert_eq!(err, ChainError::InvalidIndex { expected: 1, actual: 2 });
        assert_eq!(chain.head(), ChainPointer::of(&genesis));
    }

    #[test]
    fn append_block_rejects_wrong_prev_hash() {
        let (mut chain, genesis) = initialized();
        let other = BlockHash::digest(b"other");
        let err = chain.append_block(Block::new(1, other, "foo")).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidPrevHash {
                expected: genesis.hash(),
                actual: other
            }
        );
    }

    #[test]
    fn tip_may_run_ahead_but_not_behind() {
        let (mut chain, genesis) = initialized();
        chain.append_data("a");
        let ahead = Block::new(5, BlockHash::digest(b"x"), "far");
        chain.tip(&ahead).unwrap();
        assert_eq!(chain.tip_pointer(), ChainPointer::of(&ahead));
        assert_eq!(chain.index(), Some(1));

        let err = chain.tip(&genesis).unwrap_err();
        assert!(matches!(err, ChainError::TipBehind { tip: 0, .. }));
    }

    #[test]
    fn append_past_tip_moves_tip() {
        let (mut chain, _) = initialized();
        let b1 = chain.append_data("a");
        let b2 = chain.append_data("b");
        assert_eq!(chain.tip_pointer(), ChainPointer::of(&b2));
        assert_ne!(chain.tip_pointer(), ChainPointer::of(&b1));
    }

    #[test]
    fn same_data_same_history_same_hash() {
        let (mut a, _) = initialized();
        let (mut b, _) = initialized();
        a.append_data("foo");
        b.append_data("foo");
        assert_eq!(a.head(), b.head());
        a.append_data("bar");
        b.append_data("baz");
        assert_ne!(a.hash(), b.hash());
    }
}
