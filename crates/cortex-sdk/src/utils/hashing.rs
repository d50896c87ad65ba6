//! Hashing Utilities

use sha2::{Sha256, Digest};

/// Compute SHA-256 hash of content and return as hex string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
