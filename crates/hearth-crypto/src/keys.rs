//! Key material newtypes.
//!
//! Algorithm-neutral containers so the store and client can hold keys without
//! naming a signature or key-agreement scheme. Secret material is zeroized on
//! drop and never printed.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of every key in bytes (identity, ephemeral and symmetric).
pub const KEY_SIZE: usize = 32;

/// Size of a signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { expected: N, actual: bytes.len() })
}

/// Stable identifier of a participant: SHA-256 of the identity public key.
///
/// Rendered as lowercase hex on the wire and in topic names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId([u8; KEY_SIZE]);

impl IdentityId {
    /// Wrap a raw digest.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(text).map_err(|e| CryptoError::InvalidIdentityId(e.to_string()))?;
        let array = to_array::<KEY_SIZE>(&bytes)
            .map_err(|e| CryptoError::InvalidIdentityId(e.to_string()))?;
        Ok(Self(array))
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({}…)", self.short())
    }
}

impl Serialize for IdentityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Public half of a long-lived signing identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityPublicKey([u8; KEY_SIZE]);

impl IdentityPublicKey {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Import from wire bytes, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        to_array(bytes).map(Self)
    }

    /// Raw public key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityPublicKey({}…)", hex::encode(&self.0[..8]))
    }
}

/// Long-lived signing key pair. The secret half is exclusively owned.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    secret: [u8; KEY_SIZE],
    #[zeroize(skip)]
    public: IdentityPublicKey,
}

impl IdentityKeyPair {
    /// Assemble from a secret seed and its matching public key.
    ///
    /// Callers are responsible for the pair being consistent; providers build
    /// these through [`crate::CryptoProvider::import_identity_key_pair`].
    pub fn new(secret: [u8; KEY_SIZE], public: IdentityPublicKey) -> Self {
        Self { secret, public }
    }

    /// Public half.
    pub const fn public_key(&self) -> &IdentityPublicKey {
        &self.public
    }

    /// Secret seed bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this exposes the signing key.
    pub const fn secret_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Public half of an ephemeral key-agreement pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EphemeralPublicKey([u8; KEY_SIZE]);

impl EphemeralPublicKey {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Import from wire bytes, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        to_array(bytes).map(Self)
    }

    /// Raw public key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EphemeralPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralPublicKey({}…)", hex::encode(&self.0[..8]))
    }
}

/// Key-agreement pair generated fresh for one handshake.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EphemeralKeyPair {
    secret: [u8; KEY_SIZE],
    #[zeroize(skip)]
    public: EphemeralPublicKey,
}

impl EphemeralKeyPair {
    /// Assemble from a secret scalar and its matching public key.
    pub fn new(secret: [u8; KEY_SIZE], public: EphemeralPublicKey) -> Self {
        Self { secret, public }
    }

    /// Public half, sent in handshake packets.
    pub const fn public_key(&self) -> &EphemeralPublicKey {
        &self.public
    }

    /// Secret scalar bytes.
    pub const fn secret_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// 256-bit symmetric key: pairwise secrets and room broadcast keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Import from wire bytes, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        to_array(bytes).map(Self)
    }

    /// Raw key bytes (the export form).
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Detached signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Wrap raw signature bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Import from wire bytes, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        to_array(bytes).map(Self)
    }

    /// Raw signature bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", hex::encode(&self.0[..8]))
    }
}
