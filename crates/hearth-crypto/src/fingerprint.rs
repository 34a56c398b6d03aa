//! Short authentication strings for out-of-band verification.
//!
//! A fingerprint is four pictographs drawn from a 768-symbol alphabet
//! (U+1F300 through U+1F5FF). Two people read them to each other over a
//! trusted channel: matching identity fingerprints confirm the pinned key,
//! matching connection fingerprints confirm the pairwise secret.
//!
//! # Algorithm
//!
//! ```text
//! digest  = SHA-256(input)
//! entropy = u64::from_be_bytes(digest[0..8])
//! repeat 4×: symbol = entropy mod 768; entropy = entropy div 768
//! ```
//!
//! Symbols are concatenated in extraction order. Four symbols consume about
//! 38 of the 64 pooled bits, so modulo bias is negligible.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// First code point of the pictograph alphabet.
pub const ALPHABET_START: u32 = 0x1F300;

/// Number of distinct symbols in the alphabet.
pub const ALPHABET_SIZE: u64 = 768;

/// Symbols per fingerprint.
pub const SYMBOL_COUNT: usize = 4;

/// Deterministic human-comparable digest of some bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut pool = [0u8; 8];
        pool.copy_from_slice(&digest[..8]);
        let mut entropy = u64::from_be_bytes(pool);

        let mut text = String::with_capacity(SYMBOL_COUNT * 4);
        for _ in 0..SYMBOL_COUNT {
            text.push(symbol((entropy % ALPHABET_SIZE) as u32));
            entropy /= ALPHABET_SIZE;
        }

        Self(text)
    }

    /// The fingerprint text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual symbols in extraction order.
    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

/// Alphabet symbol for an index below [`ALPHABET_SIZE`].
fn symbol(index: u32) -> char {
    // The whole block is valid scalar values, never surrogates.
    char::from_u32(ALPHABET_START + index).unwrap_or(char::REPLACEMENT_CHARACTER)
}
