//! Cryptographically secure random generation.
//!
//! Everything here draws from the operating system CSPRNG so that artifact
//! message handles and message IDs are unguessable as well as unique.

use rand::rngs::OsRng;
use rand::RngCore;

/// Returns `len` random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Returns a fixed-size array of random bytes.
#[must_use]
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Returns `byte_len` random bytes as lowercase hex.
#[must_use]
pub fn random_hex(byte_len: usize) -> String {
    hex::encode(random_bytes(byte_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_produces_correct_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_array::<20>().len(), 20);
    }

    #[test]
    fn handles_are_unique() {
        let handles: HashSet<[u8; 20]> = (0..1000).map(|_| random_array::<20>()).collect();
        assert_eq!(handles.len(), 1000);
    }

    #[test]
    fn random_hex_is_hex() {
        let s = random_hex(16);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
