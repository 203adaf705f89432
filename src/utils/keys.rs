//! API key generation and hashing
//!
//! Plaintext keys are returned to the caller exactly once; only the SHA-256
//! hash and a short display prefix are ever stored.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random portion of a generated key
const KEY_RANDOM_LEN: usize = 32;

/// How many leading characters of the plaintext are kept for display
const PREFIX_DISPLAY_LEN: usize = 12;

/// Generate a new plaintext API key with the configured prefix
pub fn generate_api_key(prefix: &str) -> String {
    let random_part: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();

    format!("{}{}", prefix, random_part)
}

/// Hash an API key for storage and lookup
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// First bytes of the plaintext, kept so a dashboard can identify a key
pub fn display_prefix(api_key: &str) -> String {
    api_key.chars().take(PREFIX_DISPLAY_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_carry_prefix_and_are_unique() {
        let a = generate_api_key("vb_live_");
        let b = generate_api_key("vb_live_");
        assert!(a.starts_with("vb_live_"));
        assert_eq!(a.len(), "vb_live_".len() + KEY_RANDOM_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let key = "vb_live_abc123";
        let h1 = hash_api_key(key);
        let h2 = hash_api_key(key);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prefix_is_display_sized() {
        let key = generate_api_key("vb_live_");
        let prefix = display_prefix(&key);
        assert_eq!(prefix.len(), 12);
        assert!(key.starts_with(&prefix));
    }
}
