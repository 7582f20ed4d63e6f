use log::debug;
use thiserror::Error;

use super::block::Block;
use super::chain::{Blockchain, InsertReport};

/// Errors raised while decoding wire data
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] serde_json::Error),
}

/// Encodes a single block
///
/// Every field is carried verbatim, including the nonce and identity hash.
pub fn encode_block(block: &Block) -> Vec<u8> {
    // Serializing plain strings and integers into a Vec cannot fail
    serde_json::to_vec(block).unwrap_or_default()
}

/// Decodes a single block
///
/// The identity hash is taken as is; it is neither recomputed nor validated.
pub fn decode_block(bytes: &[u8]) -> Result<Block, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encodes every stored block, by height then insertion order
pub fn encode_chain(blockchain: &Blockchain) -> Vec<Vec<u8>> {
    blockchain.blocks().iter().map(encode_block).collect()
}

/// Decodes a list of encoded blocks
///
/// # Returns
///
/// The blocks in input order, or the first decoding failure
pub fn decode_blocks<B: AsRef<[u8]>>(blobs: &[B]) -> Result<Vec<Block>, CodecError> {
    blobs.iter().map(|blob| decode_block(blob.as_ref())).collect()
}

/// Rebuilds a store from encoded blocks
///
/// The store starts from genesis and every decoded block goes through the
/// normal insertion rule. Insertion is buffered: blocks whose parent comes
/// later in the list are retried once it has landed, so the input order does
/// not matter. A single undecodable blob fails the whole decode.
///
/// # Arguments
///
/// * `blobs` - Encoded blocks, in any order
/// * `difficulty` - Difficulty of the rebuilt store
///
/// # Returns
///
/// The rebuilt store and the tally of the insertion
pub fn decode_chain<B: AsRef<[u8]>>(
    blobs: &[B],
    difficulty: u32,
) -> Result<(Blockchain, InsertReport), CodecError> {
    let blocks = decode_blocks(blobs)?;
    let blockchain = Blockchain::new(difficulty);

    // Genesis is already present and carries no proof, skip it here
    let report = blockchain.insert_all(blocks.into_iter().filter(|b| !b.is_genesis()));
    debug!("Decoded chain: {:?}", report);

    Ok((blockchain, report))
}
