//! The encryption collaborator contract.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::envelope::EncryptedEnvelope;
use crate::error::{CryptoError, CryptoResult};

/// Salted one-way hash of a field value, for pseudonymous matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedValue {
    /// Base64 SHA-256 digest of salt followed by value.
    pub hash: String,
    /// Base64 salt; feed it back to `hash` to reproduce the digest.
    pub salt: String,
}

/// Contract between the audit store and its encryption collaborator.
///
/// Implementations must be safe to call concurrently; the store shares one
/// cipher across all writers and readers.
pub trait FieldCipher: Send + Sync {
    /// Encrypt a plaintext field value into a self-describing envelope.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedEnvelope>;

    /// Recover the plaintext from an envelope produced by `encrypt`.
    fn decrypt(&self, envelope: &EncryptedEnvelope) -> CryptoResult<String>;

    /// Salted one-way hash. A fresh random salt is generated when none is
    /// given; pass a previous `HashedValue::salt` to reproduce a digest.
    fn hash(&self, value: &str, salt: Option<&str>) -> CryptoResult<HashedValue>;

    /// Algorithm label recorded in envelopes.
    fn algorithm(&self) -> &str;
}

pub(crate) fn salted_sha256(
    value: &str,
    salt: Option<&str>,
    salt_length: usize,
) -> CryptoResult<HashedValue> {
    let salt_bytes = match salt {
        Some(given) => BASE64
            .decode(given)
            .map_err(|_| CryptoError::InvalidFormat("salt is not valid base64".into()))?,
        None => {
            let mut generated = vec![0u8; salt_length];
            rand::rngs::OsRng.fill_bytes(&mut generated);
            generated
        }
    };
    let mut hasher = Sha256::new();
    hasher.update(&salt_bytes);
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    Ok(HashedValue {
        hash: BASE64.encode(digest),
        salt: BASE64.encode(salt_bytes),
    })
}

/// Pass-through cipher for development and wiring tests.
///
/// Values are base64-wrapped but not encrypted. Never deploy this where
/// real data flows.
pub struct NoOpCipher;

impl FieldCipher for NoOpCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedEnvelope> {
        Ok(EncryptedEnvelope {
            ciphertext: BASE64.encode(plaintext),
            iv: String::new(),
            salt: None,
            algorithm: self.algorithm().to_owned(),
            timestamp: Utc::now(),
        })
    }

    fn decrypt(&self, envelope: &EncryptedEnvelope) -> CryptoResult<String> {
        let bytes = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|_| CryptoError::InvalidFormat("ciphertext is not valid base64".into()))?;
        String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
    }

    fn hash(&self, value: &str, salt: Option<&str>) -> CryptoResult<HashedValue> {
        salted_sha256(value, salt, 16)
    }

    fn algorithm(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_roundtrip() {
        let cipher = NoOpCipher;
        let envelope = cipher.encrypt("plain value").unwrap();
        assert_eq!(envelope.algorithm, "none");
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "plain value");
    }

    #[test]
    fn test_hash_is_reproducible_with_same_salt() {
        let cipher = NoOpCipher;
        let first = cipher.hash("user@example.com", None).unwrap();
        let second = cipher
            .hash("user@example.com", Some(&first.salt))
            .unwrap();
        assert_eq!(first.hash, second.hash);

        // A fresh salt produces a different digest.
        let third = cipher.hash("user@example.com", None).unwrap();
        assert_ne!(first.hash, third.hash);
    }

    #[test]
    fn test_hash_rejects_bad_salt() {
        let cipher = NoOpCipher;
        assert!(cipher.hash("value", Some("not base64!!")).is_err());
    }
}
