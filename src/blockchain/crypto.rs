use rand::Rng;
use sha2::{Digest, Sha256, Sha512};

/// How many nonce candidates are tried between two polls of the stop predicate
pub const STOP_POLL_INTERVAL: u64 = 4096;

/// Computes the identity hash of a block
///
/// Every field is written as its canonical text form (integers in decimal)
/// and the concatenation is digested with SHA-512.
///
/// # Returns
///
/// The digest as a 128 character lowercase hexadecimal string
pub fn identity_digest(
    height: u32,
    timestamp: i64,
    parent_hash: &str,
    size: u32,
    value: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(height.to_string().as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(parent_hash.as_bytes());
    hasher.update(size.to_string().as_bytes());
    hasher.update(value.as_bytes());

    hex::encode(hasher.finalize())
}

/// Computes the proof-of-work digest of a block
///
/// This is independent from the identity hash: SHA-256 over
/// `parent_hash ‖ nonce ‖ identity_hash`.
pub fn proof_digest(parent_hash: &str, nonce: &str, identity_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_hash.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(identity_hash.as_bytes());

    hex::encode(hasher.finalize())
}

/// Checks a proof digest against a difficulty
///
/// The first `difficulty + 1` hexadecimal characters must all be `'0'`.
/// A digest shorter than that never satisfies.
pub fn satisfies_difficulty(digest_hex: &str, difficulty: u32) -> bool {
    let required = difficulty as usize + 1;
    let prefix = digest_hex.as_bytes();

    prefix.len() >= required && prefix[..required].iter().all(|&c| c == b'0')
}

/// Searches the nonce space for a nonce that makes the proof digest of
/// `parent_hash`/`identity_hash` satisfy `difficulty`
///
/// Candidates are the decimal renderings of a `u64` counter that starts at a
/// random offset, so two nodes mining the same block do not walk the same
/// sequence.
///
/// # Arguments
///
/// * `parent_hash` - The parent hash carried by the candidate block
/// * `identity_hash` - The candidate block's identity hash
/// * `difficulty` - The difficulty to satisfy
/// * `should_stop` - Polled every `STOP_POLL_INTERVAL` candidates; the search
///   is abandoned as soon as it returns true
///
/// # Returns
///
/// The winning nonce, or `None` if the search was abandoned
pub fn mine_nonce<F>(
    parent_hash: &str,
    identity_hash: &str,
    difficulty: u32,
    mut should_stop: F,
) -> Option<String>
where
    F: FnMut() -> bool,
{
    let mut counter: u64 = rand::thread_rng().gen();
    let mut tried: u64 = 0;

    loop {
        if tried % STOP_POLL_INTERVAL == 0 && should_stop() {
            return None;
        }

        let nonce = counter.to_string();
        let digest = proof_digest(parent_hash, &nonce, identity_hash);

        if satisfies_difficulty(&digest, difficulty) {
            return Some(nonce);
        }

        counter = counter.wrapping_add(1);
        tried += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_digest_is_sha512_hex() {
        let digest = identity_digest(1, 0, "Genesis Block", 32, "Genesis");
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_identity_digest_uses_decimal_text() {
        let digest = identity_digest(2, 1700000000, "abc", 32, "payload");

        let expected = hex::encode(Sha512::digest(b"21700000000abc32payload"));
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_proof_digest_is_sha256_hex() {
        let digest = proof_digest("parent", "42", "hash");
        assert_eq!(digest.len(), 64);

        let expected = hex::encode(Sha256::digest(b"parent42hash"));
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_satisfies_difficulty_prefix_rule() {
        assert!(satisfies_difficulty("0abc", 0));
        assert!(!satisfies_difficulty("a0bc", 0));

        assert!(satisfies_difficulty("000f", 2));
        assert!(!satisfies_difficulty("00f0", 2));
        assert!(!satisfies_difficulty("f000", 2));

        // Difficulty 12 needs thirteen zeros
        assert!(satisfies_difficulty("0000000000000f", 12));
        assert!(!satisfies_difficulty("000000000000f0", 12));
    }

    #[test]
    fn test_satisfies_difficulty_short_digest() {
        assert!(!satisfies_difficulty("", 0));
        assert!(!satisfies_difficulty("00", 2));
        assert!(satisfies_difficulty("000", 2));
    }

    #[test]
    fn test_mine_nonce_finds_valid_nonce() {
        let nonce = mine_nonce("parent", "identity", 1, || false).unwrap();

        let digest = proof_digest("parent", &nonce, "identity");
        assert!(satisfies_difficulty(&digest, 1));
        assert!(nonce.parse::<u64>().is_ok());
    }

    #[test]
    fn test_mine_nonce_stops_when_asked() {
        // Unreachable difficulty, only the predicate can end the search
        let mut polls = 0;
        let nonce = mine_nonce("parent", "identity", 200, || {
            polls += 1;
            polls > 2
        });

        assert!(nonce.is_none());
        assert_eq!(polls, 3);
    }
}
