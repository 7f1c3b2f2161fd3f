//! Content hashing utilities
//!
//! BLAKE3-based digests, truncated to 64 bits. Used for parse/resolve cache
//! keys, function stamp comments, and heredoc delimiter generation. All of
//! these must be deterministic across runs for reproducible output.

/// 64-bit content hash of arbitrary bytes.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(buf)
}

/// Lowercase 16-digit hex rendering of a content hash.
pub fn hex16(hash: u64) -> String {
    format!("{hash:016x}")
}

/// Heredoc delimiter derived from the wrapped content itself.
///
/// Deriving the delimiter from the payload hash guarantees that nested
/// identical-looking text cannot prematurely terminate the heredoc, and
/// that the same input always yields the same delimiter.
pub fn heredoc_delimiter(content: &str) -> String {
    format!("TASC_EOF_{:08X}", content_hash(content.as_bytes()) >> 32)
}
