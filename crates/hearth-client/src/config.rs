//! Client tuning knobs.

use std::time::Duration;

/// Protocol client configuration.
///
/// Every field has a default matching the reference deployment; callers
/// normally build this with struct-update syntax over [`Default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Clock skew beyond which an inbound packet is logged as stale. Stale
    /// packets are still processed.
    pub staleness_window: Duration,

    /// Age after which a handshake awaiting its reply is discarded.
    pub handshake_timeout: Duration,

    /// How long a seen `msgId` is remembered.
    pub dedup_ttl: Duration,

    /// Maximum number of remembered `msgId`s; oldest evicted first.
    pub dedup_capacity: usize,

    /// Records kept per key history (shared secrets, room keys).
    pub key_history_limit: usize,

    /// Use the oldest key when no record is valid at the requested time.
    pub fallback_to_oldest_key: bool,

    /// Forget every peer on leave instead of only the left room.
    pub clear_all_peers_on_leave: bool,
}

impl ClientConfig {
    pub(crate) fn staleness_window_millis(&self) -> u64 {
        duration_millis(self.staleness_window)
    }

    pub(crate) fn handshake_timeout_millis(&self) -> u64 {
        duration_millis(self.handshake_timeout)
    }

    pub(crate) fn dedup_ttl_millis(&self) -> u64 {
        duration_millis(self.dedup_ttl)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(60),
            dedup_ttl: Duration::from_secs(10 * 60),
            dedup_capacity: 4096,
            key_history_limit: 16,
            fallback_to_oldest_key: true,
            clear_all_peers_on_leave: false,
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
