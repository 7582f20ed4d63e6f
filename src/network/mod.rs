// Network module
//
// This module contains the peer side of the sync interface:
// - Flat peer list
// - HTTP client pushing and fetching blocks

pub mod client;
pub mod peers;

pub use client::{PeerClient, PeerError};
pub use peers::PeerList;
