use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use thiserror::Error;

use crate::blockchain::codec::{decode_blocks, encode_block};
use crate::blockchain::{Block, CodecError};

/// Timeout applied to every request sent to a peer
pub const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Outbound side of the sync interface
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new() -> Result<Self, PeerError> {
        let http = reqwest::Client::builder()
            .timeout(PEER_REQUEST_TIMEOUT)
            .build()?;

        Ok(PeerClient { http })
    }

    /// Sends a block to a peer's heartbeat endpoint
    ///
    /// # Returns
    ///
    /// The insert outcome the peer reported, if it sent one
    pub async fn push_block(&self, peer: &str, block: &Block) -> Result<Option<String>, PeerError> {
        let response = self
            .http
            .post(peer_url(peer, "/heartbeat/receive"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(encode_block(block))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response
            .headers()
            .get("X-Insert-Outcome")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string))
    }

    /// Pushes a block to every peer concurrently
    ///
    /// Failures are logged and do not stop the other pushes.
    ///
    /// # Returns
    ///
    /// The number of peers that took the block
    pub async fn broadcast(&self, peers: &[String], block: &Block) -> usize {
        let pushes = peers.iter().map(|peer| async move {
            match self.push_block(peer, block).await {
                Ok(outcome) => {
                    debug!(
                        "Pushed block {} to {} ({})",
                        block.hash(),
                        peer,
                        outcome.as_deref().unwrap_or("no outcome")
                    );
                    true
                }
                Err(err) => {
                    warn!("Failed to push block {} to {}: {}", block.hash(), peer, err);
                    false
                }
            }
        });

        let delivered = join_all(pushes).await.into_iter().filter(|ok| *ok).count();
        info!(
            "Block {} delivered to {}/{} peer(s)",
            block.hash(),
            delivered,
            peers.len()
        );

        delivered
    }

    /// Downloads and decodes a peer's whole chain
    pub async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        let response = self.http.get(peer_url(peer, "/upload")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        let blobs: Vec<String> = response.json().await?;
        Ok(decode_blocks(&blobs)?)
    }

    /// Registers this node with a peer
    ///
    /// # Returns
    ///
    /// The peer's own peer list
    pub async fn announce(&self, peer: &str, self_id: &str) -> Result<Vec<String>, PeerError> {
        let response = self
            .http
            .get(peer_url(peer, "/peer"))
            .query(&[("id", self_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

// Peers are stored as bare `host:port`; an explicit scheme is kept as given
fn peer_url(peer: &str, path: &str) -> String {
    let base = peer.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}{}", base, path)
    } else {
        format!("http://{}{}", base, path)
    }
}
