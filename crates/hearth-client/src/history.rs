//! Time-indexed key histories.
//!
//! Peers rotate keys while packets are still in flight, so a key is looked up
//! by the time the packet was sent rather than by arrival order.

/// One key with the time it became valid.
#[derive(Debug, Clone)]
pub struct KeyRecord<K> {
    /// Key material.
    pub key: K,
    /// Unix epoch milliseconds from which the key applies.
    pub valid_from: u64,
}

/// Bounded list of keys ordered by `valid_from`.
///
/// # Invariants
///
/// - `valid_from` strictly increases along the list
/// - At most `limit` records; the oldest is evicted first
#[derive(Debug, Clone)]
pub struct KeyHistory<K> {
    records: Vec<KeyRecord<K>>,
    limit: usize,
}

impl<K> KeyHistory<K> {
    /// Empty history holding at most `limit` records (minimum one).
    pub fn new(limit: usize) -> Self {
        Self { records: Vec::new(), limit: limit.max(1) }
    }

    /// Insert at the position given by `valid_from`.
    ///
    /// A record with the same `valid_from` is replaced. Late arrivals for an
    /// older time slot land between existing records.
    pub fn insert(&mut self, key: K, valid_from: u64) {
        match self.records.binary_search_by_key(&valid_from, |r| r.valid_from) {
            Ok(index) => self.records[index].key = key,
            Err(index) => self.records.insert(index, KeyRecord { key, valid_from }),
        }
        self.enforce_limit();
    }

    /// Append as the newest record, never replacing an existing one.
    ///
    /// `valid_from` is bumped past the newest record when needed so
    /// back-to-back appends within one millisecond all survive. Returns the
    /// `valid_from` actually stored.
    pub fn append(&mut self, key: K, valid_from: u64) -> u64 {
        let valid_from = match self.records.last() {
            Some(newest) if newest.valid_from >= valid_from => newest.valid_from.saturating_add(1),
            _ => valid_from,
        };
        self.records.push(KeyRecord { key, valid_from });
        self.enforce_limit();
        valid_from
    }

    /// Most recent key.
    pub fn latest(&self) -> Option<&K> {
        self.latest_record().map(|r| &r.key)
    }

    /// Most recent record.
    pub fn latest_record(&self) -> Option<&KeyRecord<K>> {
        self.records.last()
    }

    /// Key valid at `at`: the greatest `valid_from <= at`.
    ///
    /// When nothing qualifies and `fallback_to_oldest` is set, the oldest
    /// record is returned instead.
    pub fn at(&self, at: u64, fallback_to_oldest: bool) -> Option<&K> {
        let qualifying = self.records.partition_point(|r| r.valid_from <= at);
        match qualifying {
            0 if fallback_to_oldest => self.records.first().map(|r| &r.key),
            0 => None,
            n => Some(&self.records[n - 1].key),
        }
    }

    /// Keys from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &K> {
        self.records.iter().rev().map(|r| &r.key)
    }

    /// Records from oldest to newest.
    pub fn records(&self) -> &[KeyRecord<K>] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record exists.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn enforce_limit(&mut self) {
        if self.records.len() > self.limit {
            let excess = self.records.len() - self.limit;
            self.records.drain(..excess);
        }
    }
}
