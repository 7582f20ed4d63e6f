//! Fork-tolerant proof-of-work ledger node
//!
//! The ledger engine lives in [`blockchain`]: blocks, digests, the chain
//! store, the miner and the wire codec. [`network`] and [`api`] expose it to
//! other nodes over HTTP, and [`node`] ties the pieces together.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod network;
pub mod node;

pub use blockchain::{Block, Blockchain, InsertOutcome};
pub use node::Node;
