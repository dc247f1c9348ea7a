//! Content hashing and integrity checking

use sha2::{Digest, Sha256};

use crate::{error::FileError, models::VersionRecord};

/// Verifies stored records through SHA-256 content hashes
#[derive(Debug, Clone, Default)]
pub struct ContentVerifier;

impl ContentVerifier {
    /// Creates a new ContentVerifier instance
    pub fn new() -> Self {
        ContentVerifier
    }

    /// Computes SHA-256 hash of content
    ///
    /// # Returns
    ///
    /// Hexadecimal string representation of the SHA-256 hash
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Verifies that a version record's snapshot matches its stored hash
    ///
    /// # Returns
    ///
    /// Ok(()) if hashes match, `FileError::Corrupted` otherwise
    pub fn verify_record(&self, record: &VersionRecord) -> Result<(), FileError> {
        let computed = Self::compute_hash(&record.content);
        if computed == record.content_hash {
            Ok(())
        } else {
            Err(FileError::Corrupted(format!(
                "version {} of {:?}: expected hash {}, computed {}",
                record.version, record.path, record.content_hash, computed
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(content: &[u8], hash: String) -> VersionRecord {
        VersionRecord {
            path: PathBuf::from("doc.md"),
            version: 1,
            timestamp: Utc::now(),
            content_hash: hash,
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_compute_hash_deterministic() {
        let hash1 = ContentVerifier::compute_hash(b"test content");
        let hash2 = ContentVerifier::compute_hash(b"test content");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, ContentVerifier::compute_hash(b"other content"));
    }

    #[test]
    fn test_compute_hash_empty() {
        // SHA-256 of empty input
        assert_eq!(
            ContentVerifier::compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_record_matching_hash() {
        let verifier = ContentVerifier::new();
        let hash = ContentVerifier::compute_hash(b"snapshot");
        assert!(verifier.verify_record(&record(b"snapshot", hash)).is_ok());
    }

    #[test]
    fn test_verify_record_mismatched_hash() {
        let verifier = ContentVerifier::new();
        let hash = ContentVerifier::compute_hash(b"original");
        match verifier.verify_record(&record(b"tampered", hash)) {
            Err(FileError::Corrupted(_)) => (),
            other => panic!("Expected Corrupted error, got {:?}", other),
        }
    }
}
