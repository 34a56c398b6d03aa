//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (wall clock, randomness).
//! Production uses [`SystemEnv`]; tests use [`test_utils::MockEnv`] with a
//! seeded RNG and a manually advanced clock so whole protocol runs replay
//! byte-for-byte.

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now_millis()` never goes backwards within one execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time in Unix epoch milliseconds.
    ///
    /// Wire timestamps and key-history `valid_from` values are expressed in
    /// this unit.
    fn now_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a fixed-size random array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Production environment using the system clock and OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A client without functioning cryptographic
/// randomness cannot generate keys or nonces safely.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - client cannot operate securely");
    }
}

/// Deterministic environment for tests and simulations.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::{
        sync::{
            Arc, Mutex, PoisonError,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use rand_chacha::{
        ChaCha20Rng,
        rand_core::{RngCore, SeedableRng},
    };

    use super::Environment;

    /// Epoch milliseconds every fresh `MockEnv` clock starts at.
    pub const MOCK_EPOCH_MILLIS: u64 = 1_700_000_000_000;

    /// Seeded RNG plus a shared, manually advanced wall clock.
    ///
    /// Clones share both the RNG stream and the clock. Use
    /// [`MockEnv::sharing_clock`] to give several simulated peers independent
    /// randomness on one timeline.
    #[derive(Clone, Debug)]
    pub struct MockEnv {
        rng: Arc<Mutex<ChaCha20Rng>>,
        clock: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Environment seeded with `0`.
        pub fn new() -> Self {
            Self::with_seed(0)
        }

        /// Environment with the given RNG seed and a fresh clock.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
                clock: Arc::new(AtomicU64::new(MOCK_EPOCH_MILLIS)),
            }
        }

        /// New environment with its own RNG seed that shares this clock.
        pub fn sharing_clock(&self, seed: u64) -> Self {
            Self {
                rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
                clock: Arc::clone(&self.clock),
            }
        }

        /// Move the shared clock forward.
        pub fn advance(&self, by: Duration) {
            self.clock.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        fn now_millis(&self) -> u64 {
            self.clock.load(Ordering::SeqCst)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
        }
    }
}
