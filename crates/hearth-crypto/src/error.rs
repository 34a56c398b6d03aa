//! Errors from cryptographic primitives.

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Imported key material has the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Bytes do not encode a valid point for the algorithm.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Identity id is not a 64-character hex string.
    #[error("invalid identity id: {0}")]
    InvalidIdentityId(String),

    /// AEAD authentication failed, or the package is truncated.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable detail.
        reason: String,
    },

    /// Diffie-Hellman produced the all-zero secret (low-order remote point).
    #[error("key agreement produced a non-contributory secret")]
    WeakKeyAgreement,
}
