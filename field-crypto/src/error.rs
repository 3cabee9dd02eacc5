use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from field encryption operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("algorithm mismatch: envelope carries {got}, cipher is {expected}")]
    AlgorithmMismatch { expected: String, got: String },

    #[error("malformed envelope: {0}")]
    InvalidFormat(String),

    #[error("nonce must be 12 bytes")]
    InvalidNonce,

    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}
