use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::blockchain::{Block, Blockchain, InsertOutcome, InsertReport, Miner, MiningError};
use crate::network::{PeerClient, PeerError, PeerList};

/// Everything a running node shares between its handlers and tasks
///
/// Built once at startup and handed to every component, so tests can run
/// isolated nodes side by side. Cloning yields another handle to the same
/// node.
#[derive(Debug, Clone)]
pub struct Node {
    /// How peers reach this node (`ip:port`)
    self_id: String,

    store: Blockchain,

    miner: Arc<Miner>,

    peers: PeerList,

    client: PeerClient,
}

impl Node {
    /// Creates a node holding only the genesis block
    ///
    /// # Arguments
    ///
    /// * `self_id` - The identifier peers reach this node with
    /// * `difficulty` - The proof-of-work difficulty
    ///
    /// # Returns
    ///
    /// A new Node instance, or an error if the peer client cannot be built
    pub fn new(self_id: String, difficulty: u32) -> Result<Self, PeerError> {
        Ok(Node {
            miner: Arc::new(Miner::new(self_id.clone())),
            self_id,
            store: Blockchain::new(difficulty),
            peers: PeerList::new(),
            client: PeerClient::new()?,
        })
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn store(&self) -> &Blockchain {
        &self.store
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn peers(&self) -> &PeerList {
        &self.peers
    }

    /// Offers a block received from a peer to the store
    pub fn receive_block(&self, block: Block) -> InsertOutcome {
        let outcome = self.store.insert(block);
        if !outcome.is_accepted() {
            info!("Peer block not stored: {}", outcome.as_str());
        }
        outcome
    }

    /// Starts a mining round in the background
    ///
    /// The nonce search runs on the blocking pool. Once a block is accepted
    /// it is pushed to every known peer; by then the store lock has long
    /// been released.
    ///
    /// # Returns
    ///
    /// The height being mined and a handle resolving to the round's result,
    /// or `AlreadyMining` while a round is in progress. The reported height
    /// is the one the round mines at; if a peer settles it first the round
    /// ends as `Superseded`.
    pub fn start_mining(
        &self,
        payload: String,
    ) -> Result<(u32, JoinHandle<Result<Block, MiningError>>), MiningError> {
        let token = self.miner.begin_round()?;
        let height = self.store.height() + 1;
        let node = self.clone();

        let handle = tokio::spawn(async move {
            let search = {
                let miner = node.miner.clone();
                let store = node.store.clone();
                tokio::task::spawn_blocking(move || {
                    miner.mine_next_block(&store, height, payload, &token)
                })
            };

            let result = match search.await {
                Ok(result) => result,
                Err(err) => {
                    warn!("Mining task failed: {}", err);
                    Err(MiningError::Cancelled)
                }
            };
            node.miner.end_round();

            if let Ok(block) = &result {
                let peers = node.peers.others(&node.self_id);
                if !peers.is_empty() {
                    node.client.broadcast(&peers, block).await;
                }
            }

            result
        });

        Ok((height, handle))
    }

    /// Joins the network through seed peers
    ///
    /// Each seed is registered, told about this node and asked for its
    /// chain, which is merged through the normal insertion rule. Seeds that
    /// cannot be reached are logged and skipped.
    pub async fn bootstrap(&self, seeds: &[String]) -> InsertReport {
        let mut total = InsertReport::default();

        for seed in seeds {
            self.peers.register(seed);

            if let Err(err) = self.client.announce(seed, &self.self_id).await {
                warn!("Could not announce to {}: {}", seed, err);
            }

            match self.client.fetch_chain(seed).await {
                Ok(blocks) => {
                    let report = self
                        .store
                        .insert_all(blocks.into_iter().filter(|b| !b.is_genesis()));
                    info!(
                        "Synced from {}: {} accepted, {} duplicate(s), {} rejected",
                        seed,
                        report.accepted,
                        report.duplicates,
                        report.bad_proof + report.no_parent
                    );
                    total.accepted += report.accepted;
                    total.duplicates += report.duplicates;
                    total.bad_proof += report.bad_proof;
                    total.no_parent += report.no_parent;
                }
                Err(err) => warn!("Could not sync from {}: {}", seed, err),
            }
        }

        total
    }
}
