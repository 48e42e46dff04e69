//! Property tests for the event history ring.

use proptest::prelude::*;
use watchhub::{Action, Event, EventHistory};

proptest! {
    #[test]
    fn prop_retains_most_recent(capacity in 1usize..64, appends in 0usize..300) {
        let mut history = EventHistory::new(capacity).unwrap();
        for i in 0..appends as u64 {
            history.add_event(Event::new(Action::Create, "/foo", i, i));
        }

        let resident: Vec<u64> = history.iter().map(|e| e.index()).collect();
        let start = appends.saturating_sub(capacity) as u64;
        let expected: Vec<u64> = (start..appends as u64).collect();
        prop_assert_eq!(resident, expected);
        prop_assert!(history.len() <= capacity);
    }

    #[test]
    fn prop_scan_from_previous_index_never_cleared(capacity in 2usize..32, appends in 1u64..500) {
        let mut history = EventHistory::new(capacity).unwrap();
        for i in 1..=appends {
            history.add_event(Event::new(Action::Set, "/foo/bar", i, i));
            let events = history.scan("/foo", true, i.saturating_sub(1).max(1)).unwrap();
            prop_assert!(!events.is_empty());
            prop_assert_eq!(events.last().map(|e| e.index()), Some(i));
        }
    }

    #[test]
    fn prop_scan_results_ascending(keys in proptest::collection::vec(0u8..4, 1..100)) {
        let mut history = EventHistory::new(1000).unwrap();
        for (i, k) in keys.iter().enumerate() {
            let key = match k {
                0 => "/a",
                1 => "/a/b",
                2 => "/a/b/c",
                _ => "/z",
            };
            let index = i as u64 + 1;
            history.add_event(Event::new(Action::Set, key, index, index));
        }

        let events = history.scan("/a", true, 1).unwrap();
        prop_assert!(events.windows(2).all(|w| w[0].index() < w[1].index()));
        prop_assert!(events.iter().all(|e| e.key() != "/z"));
        let expected = keys.iter().filter(|k| **k < 3).count();
        prop_assert_eq!(events.len(), expected);
    }
}
