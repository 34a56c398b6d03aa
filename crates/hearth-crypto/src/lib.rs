//! Hearth Cryptographic Capabilities
//!
//! The minimal set of primitives the Hearth key store and protocol client rely
//! on, exposed through the [`CryptoProvider`] trait so the rest of the stack
//! never names a concrete algorithm.
//!
//! # Key Lifecycle
//!
//! ```text
//! Identity key pair (Ed25519, long-lived)
//!        │ SHA-256
//!        ▼
//! Identity id ──► Fingerprint (4 pictographs, compared out of band)
//!
//! Ephemeral pair (X25519, per handshake)
//!        │ ECDH + HKDF-SHA256
//!        ▼
//! Pairwise shared secret ──► wraps room broadcast keys
//!
//! Room broadcast key (random, per room, rotatable)
//!        │ ChaCha20-Poly1305
//!        ▼
//! nonce(12) ‖ ciphertext ‖ tag(16)
//! ```
//!
//! # Security
//!
//! - Secret key material is zeroized on drop and redacted from `Debug`.
//! - Key agreement rejects non-contributory (all-zero) results.
//! - Signature verification uses strict Ed25519 checks.
//! - All randomness comes from the [`Environment`], so production uses the OS
//!   RNG while tests replay a seeded stream.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod env;
mod error;
pub mod fingerprint;
mod keys;
mod provider;

pub use env::{Environment, SystemEnv};
pub use error::CryptoError;
pub use fingerprint::Fingerprint;
pub use keys::{
    EphemeralKeyPair, EphemeralPublicKey, IdentityId, IdentityKeyPair, IdentityPublicKey,
    KEY_SIZE, SIGNATURE_SIZE, Signature, SymmetricKey,
};
pub use provider::{CryptoProvider, DalekProvider};
