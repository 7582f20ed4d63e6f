use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::fmt;

use super::crypto::identity_digest;
use super::{BLOCK_SIZE, GENESIS_PARENT_HASH, GENESIS_TIMESTAMP, GENESIS_VALUE};

/// Header of a block
///
/// Field names are serialized in PascalCase so blocks exchanged with other
/// nodes keep the `Header`/`Height`/`ParentHash` layout of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// Position of the block in the ledger, 1 for genesis
    pub height: u32,

    /// Creation time in seconds since the Unix epoch
    pub timestamp: i64,

    /// Identity hash (SHA-512, lowercase hex)
    pub hash: String,

    /// Identity hash of the parent block
    pub parent_hash: String,

    /// Declared payload size
    pub size: u32,

    /// Proof-of-work nonce, empty until mined
    #[serde(default)]
    pub nonce: String,
}

/// Represents a block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    /// The block header
    pub header: Header,

    /// Opaque payload
    pub value: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `height` - The height of the block
    /// * `parent_hash` - The identity hash of the parent block
    /// * `value` - The payload
    ///
    /// # Returns
    ///
    /// A new Block with its identity hash computed and an empty nonce
    pub fn new(height: u32, parent_hash: String, value: String) -> Self {
        Self::with_timestamp(height, Utc::now().timestamp(), parent_hash, value)
    }

    /// Creates a new block with an explicit creation time
    pub fn with_timestamp(height: u32, timestamp: i64, parent_hash: String, value: String) -> Self {
        let hash = identity_digest(height, timestamp, &parent_hash, BLOCK_SIZE, &value);

        Block {
            header: Header {
                height,
                timestamp,
                hash,
                parent_hash,
                size: BLOCK_SIZE,
                nonce: String::new(),
            },
            value,
        }
    }

    /// The genesis block
    ///
    /// Its timestamp is fixed so every node derives the same genesis hash.
    pub fn genesis() -> Self {
        Self::with_timestamp(
            1,
            GENESIS_TIMESTAMP,
            GENESIS_PARENT_HASH.to_string(),
            GENESIS_VALUE.to_string(),
        )
    }

    /// Returns this block carrying `nonce`
    ///
    /// The nonce is not part of the identity hash, so the hash is kept as is.
    pub fn with_nonce(self, nonce: String) -> Self {
        Block {
            header: Header {
                nonce,
                ..self.header
            },
            ..self
        }
    }

    /// Recomputes the identity hash from the current fields
    ///
    /// The stored hash is never overwritten; this is for diagnostics only.
    pub fn calculate_hash(&self) -> String {
        identity_digest(
            self.header.height,
            self.header.timestamp,
            &self.header.parent_hash,
            self.header.size,
            &self.value,
        )
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn hash(&self) -> &str {
        &self.header.hash
    }

    pub fn parent_hash(&self) -> &str {
        &self.header.parent_hash
    }

    pub fn nonce(&self) -> &str {
        &self.header.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.header.height == 1 && self.header.parent_hash == GENESIS_PARENT_HASH
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "height={} time={} hash={} parent={} size={} nonce={} value={}",
            self.header.height,
            self.header.timestamp,
            short(&self.header.hash),
            short(&self.header.parent_hash),
            self.header.size,
            self.header.nonce,
            self.value
        )
    }
}

// First 16 characters, enough to tell blocks apart in a summary
fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
