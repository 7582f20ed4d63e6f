use dashmap::DashSet;

use std::sync::Arc;

/// Flat, unauthenticated set of peer addresses
///
/// Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct PeerList {
    peers: Arc<DashSet<String>>,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer id
    ///
    /// # Returns
    ///
    /// true if the id was not known yet
    pub fn register(&self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }

        self.peers.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains(id)
    }

    /// All known peers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.peers.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    /// All known peers except `self_id`
    pub fn others(&self, self_id: &str) -> Vec<String> {
        self.ids().into_iter().filter(|id| id != self_id).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
