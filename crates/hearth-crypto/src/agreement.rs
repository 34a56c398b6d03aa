//! Pairwise secret derivation using X25519 and HKDF.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    error::CryptoError,
    keys::{EphemeralKeyPair, EphemeralPublicKey, KEY_SIZE, SymmetricKey},
};

/// Label used for pairwise secret derivation.
const PAIRWISE_LABEL: &[u8] = b"hearthPairwiseV1";

/// Build an ephemeral key pair from 32 random bytes.
pub fn ephemeral_from_random(random: [u8; KEY_SIZE]) -> EphemeralKeyPair {
    let secret = StaticSecret::from(random);
    let public = PublicKey::from(&secret);
    EphemeralKeyPair::new(secret.to_bytes(), EphemeralPublicKey::from_bytes(public.to_bytes()))
}

/// Derive the pairwise symmetric key from our ephemeral pair and the peer's
/// ephemeral public key.
///
/// Both public keys are bound into the HKDF info in sorted order, so the two
/// sides derive identical bytes regardless of who initiated.
///
/// # Security
///
/// - A non-contributory exchange (peer sent a low-order point) is rejected
/// - Deterministic: same inputs always produce same output
pub fn derive_pairwise_key(
    mine: &EphemeralKeyPair,
    theirs: &EphemeralPublicKey,
) -> Result<SymmetricKey, CryptoError> {
    let secret = StaticSecret::from(*mine.secret_bytes());
    let shared = secret.diffie_hellman(&PublicKey::from(*theirs.as_bytes()));

    if !shared.was_contributory() {
        return Err(CryptoError::WeakKeyAgreement);
    }

    let (low, high) = if mine.public_key().as_bytes() <= theirs.as_bytes() {
        (mine.public_key().as_bytes(), theirs.as_bytes())
    } else {
        (theirs.as_bytes(), mine.public_key().as_bytes())
    };

    // Capacity: 16 (label) + 32 + 32
    let mut info = Vec::with_capacity(PAIRWISE_LABEL.len() + 2 * KEY_SIZE);
    info.extend_from_slice(PAIRWISE_LABEL);
    info.extend_from_slice(low);
    info.extend_from_slice(high);

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    Ok(SymmetricKey::from_bytes(okm))
}
