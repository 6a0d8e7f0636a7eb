//! Content hashing for cache keys.
//!
//! Both response caches key on a SHA-256 digest of the request content:
//! raw container bytes for recognition, normalized text for translation.
//! Identical content within the cache horizon must never re-invoke the
//! external service, so the key has to be derived from content alone.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest, truncated to 16 bytes (32 hex chars).
///
/// Truncation keeps keys short for logging; collision odds at a cache
/// horizon of a few dozen entries are negligible.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Hash for text keys: lowercased and whitespace-collapsed first, so
/// trivially different renderings of the same utterance share a key.
pub fn text_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    content_hash(normalized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"hello!"));
    }

    #[test]
    fn content_hash_is_32_hex_chars() {
        let hash = content_hash(b"some audio bytes");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn text_hash_ignores_case_and_spacing() {
        assert_eq!(text_hash("Hello   World"), text_hash("hello world"));
        assert_eq!(text_hash("  hello world  "), text_hash("hello world"));
        assert_ne!(text_hash("hello world"), text_hash("hello worlds"));
    }

    #[test]
    fn empty_input_hashes() {
        assert_eq!(content_hash(b"").len(), 32);
        assert_eq!(text_hash(""), text_hash("   "));
    }
}
