//! Property-based tests for the capability provider
//!
//! These tests verify the contract the key store and client rely on:
//!
//! 1. **Fingerprint determinism**: same input, same fingerprint
//! 2. **Fingerprint separation**: different inputs, different fingerprints
//! 3. **AEAD round-trip**: decrypt(encrypt(m)) == m, wrong key fails
//! 4. **Key-agreement symmetry**: both sides derive identical secrets

use hearth_crypto::{
    CryptoProvider, DalekProvider, Environment, Fingerprint, SymmetricKey,
    aead::{self, NONCE_SIZE},
    agreement::{derive_pairwise_key, ephemeral_from_random},
};
use proptest::prelude::*;

// Test environment with configurable randomness
#[derive(Clone)]
struct TestEnv {
    random_byte: u8,
}

impl TestEnv {
    fn deterministic(value: u8) -> Self {
        Self { random_byte: value }
    }
}

impl Environment for TestEnv {
    fn now_millis(&self) -> u64 {
        1_700_000_000_000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(self.random_byte);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_fingerprint_is_deterministic(input in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(Fingerprint::of(&input), Fingerprint::of(&input));
        prop_assert_eq!(Fingerprint::of(&input).symbols().count(), 4);
    }

    #[test]
    fn prop_fingerprint_separates_inputs(
        a in prop::collection::vec(any::<u8>(), 1..64),
        b in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn prop_aead_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..1000),
        key in any::<[u8; 32]>(),
        nonce in any::<[u8; NONCE_SIZE]>(),
        aad in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let key = SymmetricKey::from_bytes(key);
        let package = aead::seal(&key, nonce, &plaintext, &aad);

        prop_assert_eq!(aead::open(&key, &package, &aad).unwrap(), plaintext);
    }

    #[test]
    fn prop_aead_wrong_key_fails(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        key in any::<[u8; 32]>(),
        other in any::<[u8; 32]>(),
    ) {
        prop_assume!(key != other);
        let package = aead::seal(&SymmetricKey::from_bytes(key), [0; NONCE_SIZE], &plaintext, b"");

        prop_assert!(aead::open(&SymmetricKey::from_bytes(other), &package, b"").is_err());
    }

    #[test]
    fn prop_aead_tamper_fails(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        flip in any::<prop::sample::Index>(),
    ) {
        let key = SymmetricKey::from_bytes([9; 32]);
        let mut package = aead::seal(&key, [1; NONCE_SIZE], &plaintext, b"");
        let position = flip.index(package.len());
        package[position] ^= 0x80;

        prop_assert!(aead::open(&key, &package, b"").is_err());
    }

    #[test]
    fn prop_key_agreement_is_symmetric(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
        let alice = ephemeral_from_random(a);
        let bob = ephemeral_from_random(b);

        let ab = derive_pairwise_key(&alice, bob.public_key()).unwrap();
        let ba = derive_pairwise_key(&bob, alice.public_key()).unwrap();

        prop_assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn prop_identity_id_is_stable(random_byte in any::<u8>()) {
        let crypto = DalekProvider::new(TestEnv::deterministic(random_byte));
        let pair = crypto.generate_identity_key_pair();

        let id = crypto.identity_id(pair.public_key());
        prop_assert_eq!(crypto.identity_id(pair.public_key()), id);
    }

    #[test]
    fn prop_sign_verify_roundtrip(
        random_byte in any::<u8>(),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let crypto = DalekProvider::new(TestEnv::deterministic(random_byte));
        let pair = crypto.generate_identity_key_pair();
        let signature = crypto.sign(&pair, &data);

        prop_assert!(crypto.verify(pair.public_key(), &signature, &data));
    }
}
