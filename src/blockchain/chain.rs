use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::Serialize;
use utoipa::ToSchema;

use super::block::Block;
use super::crypto::{proof_digest, satisfies_difficulty};

/// Result of offering a block to the store
///
/// Rejections are ordinary outcomes, not errors: a duplicate is a silent
/// no-op and the other two are reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Accepted,
    RejectedDuplicate,
    RejectedBadProof,
    RejectedNoParent,
}

impl InsertOutcome {
    pub fn is_accepted(self) -> bool {
        self == InsertOutcome::Accepted
    }

    /// Short label used in logs and the `X-Insert-Outcome` header
    pub fn as_str(self) -> &'static str {
        match self {
            InsertOutcome::Accepted => "accepted",
            InsertOutcome::RejectedDuplicate => "duplicate",
            InsertOutcome::RejectedBadProof => "bad_proof",
            InsertOutcome::RejectedNoParent => "no_parent",
        }
    }
}

/// Tally of a batch insertion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub bad_proof: usize,
    pub no_parent: usize,
}

impl InsertReport {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Accepted => self.accepted += 1,
            InsertOutcome::RejectedDuplicate => self.duplicates += 1,
            InsertOutcome::RejectedBadProof => self.bad_proof += 1,
            InsertOutcome::RejectedNoParent => self.no_parent += 1,
        }
    }
}

/// Structural dump of the store
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct ChainSnapshot {
    /// Blocks per height, in insertion order
    #[schema(value_type = Object)]
    pub chain: BTreeMap<u32, Vec<Block>>,

    /// Tallest height seen
    pub length: u32,
}

#[derive(Debug)]
struct ChainState {
    chain: BTreeMap<u32, Vec<Block>>,
    max_height: u32,
}

/// Fork-tolerant, height-indexed block store
///
/// Cloning yields another handle to the same store. All access goes through a
/// single mutex, and `insert` keeps it held from the duplicate scan to the
/// append.
#[derive(Debug, Clone)]
pub struct Blockchain {
    state: Arc<Mutex<ChainState>>,

    /// Mining difficulty (leading zero hex digits required, minus one)
    difficulty: u32,
}

impl Blockchain {
    /// Creates a store holding only the genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - The difficulty every inserted block must satisfy
    ///
    /// # Returns
    ///
    /// A new Blockchain instance
    pub fn new(difficulty: u32) -> Self {
        let blockchain = Blockchain {
            state: Arc::new(Mutex::new(ChainState {
                chain: BTreeMap::new(),
                max_height: 0,
            })),
            difficulty,
        };
        blockchain.insert_unchecked(Block::genesis());

        blockchain
    }

    /// Appends a block without proof or parent checks
    ///
    /// This is the initialization path for the genesis block, which has
    /// neither a real parent nor a mined nonce.
    pub(crate) fn insert_unchecked(&self, block: Block) {
        let mut state = self.lock();
        let height = block.height();

        state.chain.entry(height).or_default().push(block);
        if height > state.max_height {
            state.max_height = height;
        }
    }

    // A panic while holding the lock cannot leave a half-appended block
    // behind, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Gets all blocks at `height`, empty when there are none
    pub fn get(&self, height: u32) -> Vec<Block> {
        self.lock().chain.get(&height).cloned().unwrap_or_default()
    }

    /// Looks up a block by height and identity hash
    pub fn get_block(&self, height: u32, hash: &str) -> Option<Block> {
        self.lock()
            .chain
            .get(&height)
            .and_then(|blocks| blocks.iter().find(|b| b.hash() == hash))
            .cloned()
    }

    /// Tallest height seen
    pub fn height(&self) -> u32 {
        self.lock().max_height
    }

    /// Offers a block to the store
    ///
    /// 1. the proof digest must satisfy the store's difficulty
    /// 2. a block with the same hash at the same height makes this a no-op
    /// 3. some block at `height - 1` must carry the claimed parent hash
    /// 4. the block is appended and the tallest height updated
    ///
    /// # Returns
    ///
    /// The outcome; the store is only mutated on `Accepted`
    pub fn insert(&self, block: Block) -> InsertOutcome {
        let digest = proof_digest(block.parent_hash(), block.nonce(), block.hash());
        if !satisfies_difficulty(&digest, self.difficulty) {
            warn!(
                "Rejected block {} at height {}: proof digest {} does not meet difficulty {}",
                block.hash(),
                block.height(),
                digest,
                self.difficulty
            );
            return InsertOutcome::RejectedBadProof;
        }

        let mut state = self.lock();
        let height = block.height();

        let is_duplicate = state
            .chain
            .get(&height)
            .map_or(false, |blocks| blocks.iter().any(|b| b.hash() == block.hash()));
        if is_duplicate {
            debug!("Block {} already stored at height {}", block.hash(), height);
            return InsertOutcome::RejectedDuplicate;
        }

        let has_parent = height
            .checked_sub(1)
            .and_then(|parent_height| state.chain.get(&parent_height))
            .map_or(false, |parents| {
                parents.iter().any(|p| p.hash() == block.parent_hash())
            });
        if !has_parent {
            warn!(
                "Rejected block {} at height {}: parent {} not found",
                block.hash(),
                height,
                block.parent_hash()
            );
            return InsertOutcome::RejectedNoParent;
        }

        info!("Accepted block {} at height {}", block.hash(), height);
        state.chain.entry(height).or_default().push(block);
        if height > state.max_height {
            state.max_height = height;
        }

        InsertOutcome::Accepted
    }

    /// Inserts a batch of blocks regardless of their order
    ///
    /// Blocks rejected for a missing parent are buffered and offered again
    /// for as long as a pass accepts something, so a child listed before its
    /// parent still lands.
    pub fn insert_all<I>(&self, blocks: I) -> InsertReport
    where
        I: IntoIterator<Item = Block>,
    {
        let mut report = InsertReport::default();
        let mut pending: Vec<Block> = blocks.into_iter().collect();

        loop {
            let mut orphans = Vec::new();
            let mut progressed = false;

            for block in pending {
                match self.insert(block.clone()) {
                    InsertOutcome::RejectedNoParent => orphans.push(block),
                    outcome => {
                        progressed |= outcome.is_accepted();
                        report.record(outcome);
                    }
                }
            }

            if !progressed || orphans.is_empty() {
                report.no_parent += orphans.len();
                break;
            }
            pending = orphans;
        }

        report
    }

    /// Every stored block, by height then insertion order
    pub fn blocks(&self) -> Vec<Block> {
        self.lock().chain.values().flatten().cloned().collect()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        let state = self.lock();
        ChainSnapshot {
            chain: state.chain.clone(),
            length: state.max_height,
        }
    }

    /// Human-readable summary, one line per block
    pub fn show(&self) -> String {
        let state = self.lock();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Chain height {} (difficulty {})",
            state.max_height, self.difficulty
        );
        for (height, blocks) in &state.chain {
            let _ = writeln!(out, "Height {} ({} block(s))", height, blocks.len());
            for block in blocks {
                let _ = writeln!(out, "  {}", block);
            }
        }

        out
    }
}
