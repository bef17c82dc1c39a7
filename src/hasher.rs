//! `PasswordHasher`: a named message-digest algorithm, ISO-8859-1 byte
//! encoding, lowercase hex output. Digest input encoding is a
//! wire-compatibility constraint (see `spec.md` §9) — not to be "fixed".

use crate::error::AuthError;
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        let normalized: String = name.chars().filter(|c| *c != '-').collect::<String>().to_ascii_uppercase();
        match normalized.as_str() {
            "SHA1" => Some(DigestAlgorithm::Sha1),
            "SHA256" => Some(DigestAlgorithm::Sha256),
            "SHA384" => Some(DigestAlgorithm::Sha384),
            "SHA512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    fn digest(self, bytes: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestAlgorithm::Sha384 => hex::encode(Sha384::digest(bytes)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

/// Encode a clear password as ISO-8859-1 bytes: every `char` is truncated
/// to its low byte. Silently lossy for non-Latin-1 input by design.
fn iso_8859_1_bytes(clear: &str) -> Vec<u8> {
    clear.chars().map(|c| c as u32 as u8).collect()
}

/// A small, serialized password digesting service. The underlying digest
/// instance is stateless per call, but a lock is still held around it to
/// match the "stateful digester must be serialized" contract the caller
/// relies on when a future algorithm is not.
pub struct PasswordHasher {
    algorithm: DigestAlgorithm,
    lock: Mutex<()>,
}

impl PasswordHasher {
    pub fn new(algorithm_name: &str) -> Result<Self, AuthError> {
        let algorithm = DigestAlgorithm::parse(algorithm_name)
            .ok_or_else(|| AuthError::invalid_auth_spec(format!("unknown digest algorithm: {algorithm_name}")))?;
        Ok(PasswordHasher { algorithm, lock: Mutex::new(()) })
    }

    pub fn default_algorithm() -> Self {
        PasswordHasher::new("SHA-256").expect("SHA-256 is always a valid algorithm name")
    }

    pub fn digest(&self, clear: &str) -> String {
        let _guard = self.lock.lock();
        let bytes = iso_8859_1_bytes(clear);
        self.algorithm.digest(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let h = PasswordHasher::default_algorithm();
        assert_eq!(h.digest("s3cret"), h.digest("s3cret"));
    }

    #[test]
    fn digest_differs_for_different_input() {
        let h = PasswordHasher::default_algorithm();
        assert_ne!(h.digest("s3cret"), h.digest("wrong"));
    }

    #[test]
    fn sha256_digest_is_64_hex_chars() {
        let h = PasswordHasher::default_algorithm();
        let d = h.digest("hunter2");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(PasswordHasher::new("not-a-real-digest").is_err());
    }

    #[test]
    fn accepts_hyphenated_and_bare_names() {
        assert!(PasswordHasher::new("SHA-256").is_ok());
        assert!(PasswordHasher::new("sha256").is_ok());
    }

    #[test]
    fn non_latin1_input_is_lossily_truncated() {
        // U+0129 and U+00E9 share a low byte (0x29 vs 0xE9 differ, but
        // U+0129 truncates to 0x29 == ')' — confirm truncation happens
        // rather than a panic or lossless encode.
        let truncated = iso_8859_1_bytes("\u{129}");
        assert_eq!(truncated, vec![0x29]);
    }
}
