//! The capability contract and its Dalek/RustCrypto implementation.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::{
    aead::{self, NONCE_SIZE},
    agreement,
    env::Environment,
    error::CryptoError,
    fingerprint::Fingerprint,
    keys::{
        EphemeralKeyPair, EphemeralPublicKey, IdentityId, IdentityKeyPair, IdentityPublicKey,
        Signature, SymmetricKey,
    },
};

/// Stateless cryptographic operations the key store and client depend on.
///
/// Everything above this trait is algorithm-neutral: a test fake or an
/// alternative suite only has to implement these methods.
///
/// # Invariants
///
/// - `identity_id` and `fingerprint` are pure functions of their input
/// - `derive_shared_secret(a, B) == derive_shared_secret(b, A)` byte for byte
/// - `aead_decrypt(k, aead_encrypt(k, m, ad), ad) == m`
pub trait CryptoProvider: Clone + Send + Sync + 'static {
    /// New long-lived signing identity.
    fn generate_identity_key_pair(&self) -> IdentityKeyPair;

    /// New key-agreement pair for one handshake.
    fn generate_ephemeral_key_pair(&self) -> EphemeralKeyPair;

    /// New random symmetric key.
    fn generate_symmetric_key(&self) -> SymmetricKey;

    /// Fixed-length digest of a public key.
    fn identity_id(&self, public_key: &IdentityPublicKey) -> IdentityId;

    /// Short human-comparable string for `bytes`.
    fn fingerprint(&self, bytes: &[u8]) -> Fingerprint {
        Fingerprint::of(bytes)
    }

    /// Pairwise key from our ephemeral pair and the peer's ephemeral public.
    fn derive_shared_secret(
        &self,
        mine: &EphemeralKeyPair,
        theirs: &EphemeralPublicKey,
    ) -> Result<SymmetricKey, CryptoError>;

    /// Sign `data` with the identity key.
    fn sign(&self, key_pair: &IdentityKeyPair, data: &[u8]) -> Signature;

    /// Check `signature` over `data`. Never errors; malformed keys are `false`.
    fn verify(&self, public_key: &IdentityPublicKey, signature: &Signature, data: &[u8]) -> bool;

    /// Encrypt to `nonce ‖ ciphertext ‖ tag`, authenticating `aad` alongside.
    fn aead_encrypt(&self, key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> Vec<u8>;

    /// Decrypt a package from [`CryptoProvider::aead_encrypt`] with the same
    /// associated data.
    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        package: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Rebuild a signing pair from exported secret bytes.
    fn import_identity_key_pair(&self, secret: &[u8]) -> Result<IdentityKeyPair, CryptoError>;

    /// Export a symmetric key for wire transport.
    fn export_symmetric_key(&self, key: &SymmetricKey) -> Vec<u8> {
        key.as_bytes().to_vec()
    }

    /// Import a symmetric key received over the wire.
    fn import_symmetric_key(&self, bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
        SymmetricKey::from_slice(bytes)
    }

    /// Import an identity public key received over the wire.
    fn import_identity_public_key(&self, bytes: &[u8]) -> Result<IdentityPublicKey, CryptoError> {
        IdentityPublicKey::from_slice(bytes)
    }

    /// Import an ephemeral public key received over the wire.
    fn import_ephemeral_public_key(
        &self,
        bytes: &[u8],
    ) -> Result<EphemeralPublicKey, CryptoError> {
        EphemeralPublicKey::from_slice(bytes)
    }
}

/// Ed25519 + X25519 + ChaCha20-Poly1305 provider.
///
/// Randomness comes from the wrapped [`Environment`].
#[derive(Clone, Debug)]
pub struct DalekProvider<E: Environment> {
    env: E,
}

impl<E: Environment> DalekProvider<E> {
    /// Provider drawing randomness from `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// The wrapped environment.
    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E: Environment> CryptoProvider for DalekProvider<E> {
    fn generate_identity_key_pair(&self) -> IdentityKeyPair {
        let signing_key = SigningKey::from_bytes(&self.env.random_array());
        key_pair_from_signing_key(&signing_key)
    }

    fn generate_ephemeral_key_pair(&self) -> EphemeralKeyPair {
        agreement::ephemeral_from_random(self.env.random_array())
    }

    fn generate_symmetric_key(&self) -> SymmetricKey {
        SymmetricKey::from_bytes(self.env.random_array())
    }

    fn identity_id(&self, public_key: &IdentityPublicKey) -> IdentityId {
        IdentityId::from_bytes(Sha256::digest(public_key.as_bytes()).into())
    }

    fn derive_shared_secret(
        &self,
        mine: &EphemeralKeyPair,
        theirs: &EphemeralPublicKey,
    ) -> Result<SymmetricKey, CryptoError> {
        agreement::derive_pairwise_key(mine, theirs)
    }

    fn sign(&self, key_pair: &IdentityKeyPair, data: &[u8]) -> Signature {
        let signing_key = SigningKey::from_bytes(key_pair.secret_bytes());
        Signature::from_bytes(signing_key.sign(data).to_bytes())
    }

    fn verify(&self, public_key: &IdentityPublicKey, signature: &Signature, data: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        verifying_key.verify_strict(data, &signature).is_ok()
    }

    fn aead_encrypt(&self, key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
        let nonce: [u8; NONCE_SIZE] = self.env.random_array();
        aead::seal(key, nonce, plaintext, aad)
    }

    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        package: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        aead::open(key, package, aad)
    }

    fn import_identity_public_key(&self, bytes: &[u8]) -> Result<IdentityPublicKey, CryptoError> {
        let key = IdentityPublicKey::from_slice(bytes)?;
        VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(key)
    }

    fn import_identity_key_pair(&self, secret: &[u8]) -> Result<IdentityKeyPair, CryptoError> {
        let seed: [u8; 32] = secret.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: crate::KEY_SIZE,
            actual: secret.len(),
        })?;
        Ok(key_pair_from_signing_key(&SigningKey::from_bytes(&seed)))
    }
}

fn key_pair_from_signing_key(signing_key: &SigningKey) -> IdentityKeyPair {
    IdentityKeyPair::new(
        signing_key.to_bytes(),
        IdentityPublicKey::from_bytes(signing_key.verifying_key().to_bytes()),
    )
}
