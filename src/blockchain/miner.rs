use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use thiserror::Error;
use tokio::sync::watch;

use super::block::Block;
use super::chain::{Blockchain, InsertOutcome};
use super::crypto::mine_nonce;

/// Reasons a mining round ends without an accepted block
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining round was cancelled")]
    Cancelled,

    #[error("Height {height} was settled by another block")]
    Superseded { height: u32 },

    #[error("No parent available at height {height}")]
    NoParent { height: u32 },

    #[error("Mined block was rejected: {}", .0.as_str())]
    Rejected(InsertOutcome),

    #[error("A mining round is already in progress")]
    AlreadyMining,
}

/// Where the miner currently stands
///
/// A round moves `Idle -> Searching -> Idle`, passing through `Found` when a
/// block is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Searching { height: u32 },
    Found { height: u32, hash: String },
}

/// How a finished round ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// The height the round mined at
    pub height: u32,

    /// Hash of the accepted block, or why there is none
    pub result: Result<String, MiningError>,
}

/// Cooperative cancellation flag shared with a running search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Searches for proof-of-work on top of a store
///
/// Only one round runs at a time. Progress and round outcomes are published
/// on watch channels, so callers observe completion by subscribing instead
/// of polling.
#[derive(Debug)]
pub struct Miner {
    /// Identifier of the node this miner belongs to
    id: String,

    state: watch::Sender<MinerState>,

    /// Outcome of the last finished round
    outcome: watch::Sender<Option<RoundOutcome>>,

    /// Token of the round in progress, if any
    round: Mutex<Option<CancelToken>>,
}

impl Miner {
    pub fn new(id: String) -> Self {
        let (state, _) = watch::channel(MinerState::Idle);
        let (outcome, _) = watch::channel(None);

        Miner {
            id,
            state,
            outcome,
            round: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> MinerState {
        self.state.borrow().clone()
    }

    /// Watches state transitions of this miner
    pub fn subscribe(&self) -> watch::Receiver<MinerState> {
        self.state.subscribe()
    }

    pub fn last_outcome(&self) -> Option<RoundOutcome> {
        self.outcome.borrow().clone()
    }

    /// Watches round outcomes; `None` until the first round finishes
    pub fn subscribe_outcomes(&self) -> watch::Receiver<Option<RoundOutcome>> {
        self.outcome.subscribe()
    }

    pub fn is_mining(&self) -> bool {
        self.round
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Claims the miner for a new round
    ///
    /// # Returns
    ///
    /// The round's cancellation token, or `AlreadyMining` while another round
    /// has not finished
    pub fn begin_round(&self) -> Result<CancelToken, MiningError> {
        let mut round = self.round.lock().unwrap_or_else(PoisonError::into_inner);
        if round.is_some() {
            return Err(MiningError::AlreadyMining);
        }

        let token = CancelToken::new();
        *round = Some(token.clone());
        Ok(token)
    }

    /// Releases the miner after a round, whatever its outcome
    pub fn end_round(&self) {
        self.round
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Aborts the round in progress, if any
    pub fn cancel(&self) {
        if let Some(token) = self
            .round
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            token.cancel();
        }
    }

    /// Mines one block at `height` and offers it to the store
    ///
    /// The parent is the first block at `height - 1`. The search is abandoned
    /// when `cancel` fires or when the store reaches `height` through another
    /// block. There is no retry: a rejected or abandoned round is simply
    /// reported. The miner is back to `Idle` when this returns.
    ///
    /// # Arguments
    ///
    /// * `store` - The store to read the parent from and insert into
    /// * `height` - Height of the new block, usually `store.height() + 1`
    /// * `payload` - Payload of the new block
    /// * `cancel` - Token aborting the search
    ///
    /// # Returns
    ///
    /// The accepted block
    pub fn mine_next_block(
        &self,
        store: &Blockchain,
        height: u32,
        payload: String,
        cancel: &CancelToken,
    ) -> Result<Block, MiningError> {
        let result = self.search(store, height, payload, cancel);
        match &result {
            Ok(block) => {
                info!(
                    "Miner {} mined block {} at height {}",
                    self.id,
                    block.hash(),
                    height
                );
                self.state.send_replace(MinerState::Found {
                    height,
                    hash: block.hash().to_string(),
                });
            }
            Err(error) => info!("Miner {} gave up on height {}: {}", self.id, height, error),
        }

        self.state.send_replace(MinerState::Idle);
        self.outcome.send_replace(Some(RoundOutcome {
            height,
            result: result
                .as_ref()
                .map(|block| block.hash().to_string())
                .map_err(Clone::clone),
        }));

        result
    }

    fn search(
        &self,
        store: &Blockchain,
        height: u32,
        payload: String,
        cancel: &CancelToken,
    ) -> Result<Block, MiningError> {
        let parent = height
            .checked_sub(1)
            .and_then(|parent_height| store.get(parent_height).into_iter().next())
            .ok_or(MiningError::NoParent { height })?;

        if store.height() >= height {
            return Err(MiningError::Superseded { height });
        }

        let candidate = Block::new(height, parent.hash().to_string(), payload);
        self.state.send_replace(MinerState::Searching { height });
        debug!(
            "Miner {} searching nonce for {} at height {}",
            self.id,
            candidate.hash(),
            height
        );

        let nonce = mine_nonce(
            candidate.parent_hash(),
            candidate.hash(),
            store.difficulty(),
            || cancel.is_cancelled() || store.height() >= height,
        );

        let nonce = match nonce {
            Some(nonce) => nonce,
            None if cancel.is_cancelled() => return Err(MiningError::Cancelled),
            None => return Err(MiningError::Superseded { height }),
        };

        let block = candidate.with_nonce(nonce);
        match store.insert(block.clone()) {
            InsertOutcome::Accepted => Ok(block),
            outcome => Err(MiningError::Rejected(outcome)),
        }
    }
}
