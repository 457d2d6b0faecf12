//! Lineage audit over stored blocks.

use peerchain_store::{BlockStore, StoreResult};
use peerchain_types::{Block, BlockHash, ChainPointer};
use serde::{Deserialize, Serialize};

/// Result of walking a stored lineage from a head back to genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageReport {
    /// Where the walk started.
    pub head: ChainPointer,
    /// Blocks found and checked.
    pub blocks_checked: u64,
    /// `true` if the walk reached genesis without a missing block.
    pub complete: bool,
    pub violations: Vec<String>,
}

impl LineageReport {
    pub fn is_valid(&self) -> bool {
        self.complete && self.violations.is_empty()
    }
}

/// Blocks from `head` back to genesis, newest first.
///
/// Stops early at the first block missing from storage.
pub async fn walk_back(blocks: &BlockStore, head: ChainPointer) -> StoreResult<Vec<Block>> {
    let mut lineage = Vec::new();
    let mut next = head.index.map(|_| head.hash);
    while let Some(hash) = next {
        let Some(block) = blocks.get(&hash).await? else {
            break;
        };
        next = (!block.is_genesis()).then(|| block.prev_hash());
        lineage.push(block);
    }
    Ok(lineage)
}

/// Check index continuity, predecessor links and hashes from `head` down.
pub async fn verify_lineage(blocks: &BlockStore, head: ChainPointer) -> StoreResult<LineageReport> {
    let mut violations = Vec::new();
    let mut checked = 0u64;
    let mut complete = head.is_origin();
    let mut expected = head;

    while let Some(index) = expected.index {
        let Some(block) = blocks.get(&expected.hash).await? else {
            violations.push(format!("#{index}: block {} missing", expected.hash.short_hex()));
            break;
        };
        checked += 1;

        if block.index() != index {
            violations.push(format!("#{index}: stored block has index {}", block.index()));
        }
        if !block.verify() {
            violations.push(format!("#{index}: hash does not recompute"));
        }
        if index == 0 {
            if !block.prev_hash().is_zero() {
                violations.push("#0: genesis has a non-zero prev_hash".into());
            }
            complete = true;
            break;
        }
        expected = ChainPointer {
            index: Some(index - 1),
            hash: block.prev_hash(),
        };
        if expected.hash == BlockHash::zero() {
            violations.push(format!("#{index}: prev_hash is zero above genesis"));
            break;
        }
    }

    Ok(LineageReport {
        head,
        blocks_checked: checked,
        complete,
        violations,
    })
}
