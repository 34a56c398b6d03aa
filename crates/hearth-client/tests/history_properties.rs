//! Property tests for key-history lookup and the replay filter.

use std::collections::BTreeMap;

use hearth_client::{DedupCache, KeyHistory};
use hearth_proto::MsgId;
use proptest::prelude::*;

proptest! {
    /// `at` returns the key with the greatest `valid_from <= t`, whatever
    /// order the records arrived in.
    #[test]
    fn lookup_matches_ordered_map(
        inserts in prop::collection::vec((0u64..1_000, any::<u32>()), 1..32),
        lookups in prop::collection::vec(0u64..1_100, 1..16),
        fallback in any::<bool>(),
    ) {
        let mut history = KeyHistory::new(64);
        let mut model = BTreeMap::new();
        for (valid_from, key) in &inserts {
            history.insert(*key, *valid_from);
            model.insert(*valid_from, *key);
        }

        for t in lookups {
            let expected = model
                .range(..=t)
                .next_back()
                .map(|(_, key)| key)
                .or_else(|| if fallback { model.values().next() } else { None });
            prop_assert_eq!(history.at(t, fallback), expected);
        }
        prop_assert_eq!(history.latest(), model.values().next_back());
    }

    /// Records stay sorted and bounded regardless of insertion order.
    #[test]
    fn records_sorted_and_bounded(
        inserts in prop::collection::vec((0u64..10_000, any::<u8>()), 0..64),
        limit in 1usize..16,
    ) {
        let mut history = KeyHistory::new(limit);
        for (valid_from, key) in inserts {
            history.insert(key, valid_from);
        }

        prop_assert!(history.len() <= limit);
        let times: Vec<u64> = history.records().iter().map(|r| r.valid_from).collect();
        prop_assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    /// Appends within one millisecond never overwrite each other.
    #[test]
    fn appends_are_never_lost(count in 1usize..16, at in 0u64..1_000) {
        let mut history = KeyHistory::new(16);
        for key in 0..count {
            history.append(key, at);
        }

        prop_assert_eq!(history.len(), count);
        prop_assert_eq!(history.latest(), Some(&(count - 1)));
        let newest_first: Vec<usize> = history.newest_first().copied().collect();
        prop_assert_eq!(newest_first, (0..count).rev().collect::<Vec<_>>());
    }

    /// A message id is accepted once until it expires.
    #[test]
    fn dedup_accepts_each_id_once(ids in prop::collection::vec("[a-f0-9]{8}", 1..64)) {
        let mut cache = DedupCache::new(60_000, 1_024);
        let mut seen = std::collections::HashSet::new();
        for id in &ids {
            let fresh = cache.insert(&MsgId::from(id.as_str()), 0);
            prop_assert_eq!(fresh, seen.insert(id.clone()));
        }
    }
}
