use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::cipher::{salted_sha256, FieldCipher, HashedValue};
use crate::envelope::EncryptedEnvelope;
use crate::error::{CryptoError, CryptoResult};

const ALGORITHM: &str = "AES-256-GCM";
const NONCE_LEN: usize = 12;

/// AES-256-GCM field cipher.
///
/// 96-bit random nonces, authenticated ciphertext, base64 transport, and
/// the master key zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct Aes256GcmCipher {
    #[zeroize(skip)]
    cipher: Aes256Gcm,
    /// Master key - automatically zeroized on drop
    key: [u8; 32],
    #[zeroize(skip)]
    salt_length: usize,
}

impl Aes256GcmCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: [u8; 32]) -> CryptoResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::InvalidKey("not a valid AES-256 key".into()))?;
        Ok(Self {
            cipher,
            key,
            salt_length: 16,
        })
    }

    /// Create a cipher from a base64-encoded key.
    pub fn from_base64(key_b64: &str) -> CryptoResult<Self> {
        let key_bytes = BASE64
            .decode(key_b64)
            .map_err(|_| CryptoError::InvalidKey("key is not valid base64".into()))?;

        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: key_bytes.len(),
            });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Self::new(key)
    }

    /// Salt length used when `hash` generates a fresh salt.
    pub fn with_salt_length(mut self, length: usize) -> Self {
        self.salt_length = length.max(8);
        self
    }

    /// Generate a cryptographically secure random key.
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Generate a key and encode it as base64 for configuration storage.
    pub fn generate_key_base64() -> String {
        BASE64.encode(Self::generate_key())
    }
}

impl FieldCipher for Aes256GcmCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedEnvelope> {
        // Random 96-bit nonce per value; GCM security depends on never
        // reusing one under the same key.
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed("AES-GCM encryption failed".into()))?;

        Ok(EncryptedEnvelope {
            ciphertext: BASE64.encode(&ciphertext),
            iv: BASE64.encode(nonce_bytes),
            salt: None,
            algorithm: ALGORITHM.to_owned(),
            timestamp: Utc::now(),
        })
    }

    fn decrypt(&self, envelope: &EncryptedEnvelope) -> CryptoResult<String> {
        if envelope.algorithm != ALGORITHM {
            return Err(CryptoError::AlgorithmMismatch {
                expected: ALGORITHM.to_owned(),
                got: envelope.algorithm.clone(),
            });
        }

        let nonce_bytes = BASE64
            .decode(&envelope.iv)
            .map_err(|_| CryptoError::InvalidFormat("iv is not valid base64".into()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonce);
        }

        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|_| CryptoError::InvalidFormat("ciphertext is not valid base64".into()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".into()))?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    fn hash(&self, value: &str, salt: Option<&str>) -> CryptoResult<HashedValue> {
        salted_sha256(value, salt, self.salt_length)
    }

    fn algorithm(&self) -> &str {
        ALGORITHM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Aes256GcmCipher {
        Aes256GcmCipher::new(Aes256GcmCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let envelope = cipher.encrypt("Sensitive contact message").unwrap();

        assert_eq!(envelope.algorithm, "AES-256-GCM");
        assert_ne!(envelope.ciphertext, "Sensitive contact message");
        assert_eq!(
            cipher.decrypt(&envelope).unwrap(),
            "Sensitive contact message"
        );
    }

    #[test]
    fn test_same_plaintext_different_envelopes() {
        let cipher = cipher();
        let first = cipher.encrypt("same plaintext").unwrap();
        let second = cipher.encrypt("same plaintext").unwrap();

        // Fresh nonce every time, so ciphertexts never repeat.
        assert_ne!(first.ciphertext, second.ciphertext);
        assert_ne!(first.iv, second.iv);
        assert_eq!(cipher.decrypt(&first).unwrap(), "same plaintext");
        assert_eq!(cipher.decrypt(&second).unwrap(), "same plaintext");
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let cipher = cipher();
        let mut envelope = cipher.encrypt("authenticated data").unwrap();

        let mut raw = BASE64.decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0xff;
        envelope.ciphertext = BASE64.encode(raw);

        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = cipher().encrypt("keyed data").unwrap();
        let other = cipher();
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn test_algorithm_mismatch_is_rejected() {
        let cipher = cipher();
        let mut envelope = cipher.encrypt("data").unwrap();
        envelope.algorithm = "ROT13".into();
        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(CryptoError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_from_base64_key() {
        let key_b64 = Aes256GcmCipher::generate_key_base64();
        let cipher = Aes256GcmCipher::from_base64(&key_b64).unwrap();

        let envelope = cipher.encrypt("base64 key test").unwrap();
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "base64 key test");
    }

    #[test]
    fn test_invalid_key_length() {
        let short = BASE64.encode(b"too_short");
        assert!(matches!(
            Aes256GcmCipher::from_base64(&short),
            Err(CryptoError::InvalidKeyLength { got: 9, .. })
        ));
    }

    #[test]
    fn test_empty_and_unicode_plaintext() {
        let cipher = cipher();
        for plaintext in ["", "héllo wörld 🔒"] {
            let envelope = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&envelope).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(
            Aes256GcmCipher::generate_key(),
            Aes256GcmCipher::generate_key()
        );
    }

    #[test]
    fn test_hash_respects_configured_salt_length() {
        let cipher = cipher().with_salt_length(24);
        let hashed = cipher.hash("value", None).unwrap();
        assert_eq!(BASE64.decode(hashed.salt).unwrap().len(), 24);
    }
}
