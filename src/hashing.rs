//! Content hashing helpers shared by drivers and the file store

use sha2::{Digest, Sha256};

/// Digest algorithms used across the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// 256-bit digest recorded in file handles for integrity checks
    Sha256,
    /// Short content hash the file store keeps per record
    Md5,
}

/// Hash `data` and return the lowercase hex digest
pub fn hash_content(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        HashAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
    }
}

/// Shorthand for the digest stored in handles
pub fn sha256_hex(data: &[u8]) -> String {
    hash_content(data, HashAlgorithm::Sha256)
}

/// Returns true if `value` looks like a hex encoded SHA-256 digest
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            hash_content(b"abc", HashAlgorithm::Md5),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex(b"hello")));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&sha256_hex(b"hello").to_uppercase()));
        assert!(!is_sha256_hex(&"z".repeat(64)));
    }
}
