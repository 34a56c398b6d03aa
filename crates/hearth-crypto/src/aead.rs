//! Authenticated encryption using `ChaCha20-Poly1305`.
//!
//! All functions are pure - the nonce must be provided by the caller. This
//! keeps encryption deterministic under a seeded [`crate::Environment`].
//!
//! Package layout: `[nonce: 12][ciphertext][tag: 16]`.
//!
//! Associated data is authenticated but not carried in the package; the
//! receiver must rebuild the same bytes to open it.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::CryptoError, keys::SymmetricKey};

/// Nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` bound to `aad`, returning
/// `nonce ‖ ciphertext ‖ tag`.
///
/// # Security
///
/// Caller MUST never reuse a nonce with the same key. Production callers draw
/// it from the OS RNG; 96 random bits are ample for the message volumes of a
/// single room key.
pub fn seal(
    key: &SymmetricKey,
    nonce: [u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let payload = Payload { msg: plaintext, aad };
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), payload) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut package = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    package.extend_from_slice(&nonce);
    package.extend_from_slice(&ciphertext);
    package
}

/// Decrypt a package produced by [`seal`].
///
/// # Errors
///
/// - `DecryptionFailed` if the package is shorter than nonce + tag, or if
///   authentication fails (tampering, wrong key or different `aad`)
pub fn open(key: &SymmetricKey, package: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if package.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("package too short: {} bytes", package.len()),
        });
    }

    let (nonce, ciphertext) = package.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let payload = Payload { msg: ciphertext, aad };
    cipher.decrypt(Nonce::from_slice(nonce), payload).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}
