// Ledger module
//
// This module contains the ledger engine:
// - Block and header structure
// - Identity and proof-of-work digests
// - Fork-tolerant chain store
// - Miner
// - Wire codec

pub mod block;
pub mod chain;
pub mod codec;
pub mod crypto;
pub mod miner;

// Re-export main components for easier access
pub use block::{Block, Header};
pub use chain::{Blockchain, ChainSnapshot, InsertOutcome, InsertReport};
pub use codec::CodecError;
pub use miner::{CancelToken, Miner, MinerState, MiningError, RoundOutcome};

/// Process-wide proof-of-work difficulty
pub const DEFAULT_DIFFICULTY: u32 = 12;

/// Declared payload size stamped on every block
pub const BLOCK_SIZE: u32 = 32;

/// Parent hash sentinel of the genesis block
pub const GENESIS_PARENT_HASH: &str = "Genesis Block";

/// Payload of the genesis block
pub const GENESIS_VALUE: &str = "Genesis";

/// Creation time of the genesis block
pub const GENESIS_TIMESTAMP: i64 = 0;
