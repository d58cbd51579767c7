//! Content fingerprints: incremental hashing and the (hash, size) pair
//! handed to change detection.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hash algorithm used for content fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Name published alongside checksums (e.g. catalogue `checksum.type`).
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn hasher(&self) -> ContentHasher {
        match self {
            HashAlgorithm::Sha1 => ContentHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }
}

/// Running content hash, fed chunk by chunk.
pub enum ContentHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha1(h) => h.update(data),
            ContentHasher::Sha256(h) => h.update(data),
        }
    }

    /// Consume the hasher and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha1(h) => hex::encode(h.finalize()),
            ContentHasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Evidence passed to change detection. Either part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: Option<String>,
    pub size: Option<u64>,
}

impl Fingerprint {
    /// Cheap probe: declared length only.
    pub fn size(size: u64) -> Self {
        Self {
            hash: None,
            size: Some(size),
        }
    }

    /// Full content hash.
    pub fn hash(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            size: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_none() && self.size.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_digest() {
        let mut hasher = HashAlgorithm::Sha1.hasher();
        hasher.update(b"abc");
        assert_eq!(
            hasher.finalize_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut chunked = HashAlgorithm::Sha256.hasher();
        chunked.update(b"some initial ");
        chunked.update(b"binary data: \x00\x01");

        let mut whole = HashAlgorithm::Sha256.hasher();
        whole.update(b"some initial binary data: \x00\x01");

        assert_eq!(chunked.finalize_hex(), whole.finalize_hex());
    }

    #[test]
    fn test_algorithm_from_yaml() {
        let algo: HashAlgorithm = serde_yaml::from_str("sha256").unwrap();
        assert_eq!(algo, HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::default().as_str(), "sha1");
    }

    #[test]
    fn test_fingerprint_constructors() {
        assert_eq!(Fingerprint::size(3).size, Some(3));
        assert!(Fingerprint::hash("h").size.is_none());
        assert!(Fingerprint::default().is_empty());
    }
}
