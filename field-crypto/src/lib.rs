//! Field-level encryption for the audit store.
//!
//! Sensitive detail fields are encrypted before persistence and stored as
//! self-describing envelopes, so the read path can recognize and reverse
//! them without consulting configuration. The cipher sits behind the
//! [`FieldCipher`] trait so stores and tests can swap implementations.

pub mod aes;
pub mod cipher;
pub mod envelope;
pub mod error;

pub use aes::Aes256GcmCipher;
pub use cipher::{FieldCipher, HashedValue, NoOpCipher};
pub use envelope::EncryptedEnvelope;
pub use error::{CryptoError, CryptoResult};
