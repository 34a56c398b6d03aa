//! Replay suppression for at-least-once delivery.

use std::collections::{HashMap, VecDeque};

use hearth_proto::MsgId;

/// Remembers recently seen `msgId`s.
///
/// # Invariants
///
/// - `order` and `seen` hold exactly the same ids
/// - `order` is sorted by insertion time, so expiry pops from the front
#[derive(Debug)]
pub struct DedupCache {
    seen: HashMap<MsgId, u64>,
    order: VecDeque<(MsgId, u64)>,
    ttl_millis: u64,
    capacity: usize,
}

impl DedupCache {
    /// Cache remembering ids for `ttl_millis`, holding at most `capacity`.
    pub fn new(ttl_millis: u64, capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            ttl_millis,
            capacity: capacity.max(1),
        }
    }

    /// Record `id` at `now`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &MsgId, now: u64) -> bool {
        self.evict_expired(now);
        if self.seen.contains_key(id) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.clone(), now);
        self.order.push_back((id.clone(), now));
        true
    }

    /// Drop ids older than the TTL.
    pub fn evict_expired(&mut self, now: u64) {
        while let Some((id, seen_at)) = self.order.front() {
            if now.saturating_sub(*seen_at) < self.ttl_millis {
                break;
            }
            self.seen.remove(id);
            self.order.pop_front();
        }
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
