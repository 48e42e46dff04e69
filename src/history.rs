//! Bounded history of recent events.
//!
//! The history is a fixed-capacity ring: once full, each append overwrites
//! the oldest slot. Watchers use [`EventHistory::scan`] to catch up on
//! events that happened before they subscribed.

use crate::error::{Result, WatchError};
use crate::event::Event;
use crate::types::is_descendant;
use std::sync::Arc;

/// Ring buffer of the most recent events, oldest first.
///
/// Not synchronized on its own; the hub keeps it under its lock.
#[derive(Clone, Debug)]
pub struct EventHistory {
    /// Slots; grows until `capacity`, then is overwritten in place.
    events: Vec<Arc<Event>>,
    /// Slot holding the oldest event.
    front: usize,
    capacity: usize,
    /// Index of the newest event pushed out of the ring, if any.
    last_evicted: Option<u64>,
}

impl EventHistory {
    /// Create an empty history holding at most `capacity` events.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(WatchError::InvalidCapacity(capacity));
        }
        Ok(Self {
            events: Vec::with_capacity(capacity),
            front: 0,
            capacity,
            last_evicted: None,
        })
    }

    /// Append an event, evicting the oldest one if the ring is full.
    ///
    /// Returns the stored event so callers can hand out the same allocation.
    pub fn add_event(&mut self, event: impl Into<Arc<Event>>) -> Arc<Event> {
        let event = event.into();

        if self.events.len() < self.capacity {
            self.events.push(Arc::clone(&event));
        } else {
            let evicted = std::mem::replace(&mut self.events[self.front], Arc::clone(&event));
            self.last_evicted = Some(evicted.index());
            self.front = (self.front + 1) % self.capacity;
        }

        event
    }

    /// All resident events at or after `since_index` whose key matches.
    ///
    /// Non-recursive scans match `key` exactly; recursive scans also match
    /// strict descendants of `key`. Results are in index order and may be
    /// empty. Fails with [`WatchError::EventIndexCleared`] when an event at
    /// or after `since_index` may already have been evicted.
    pub fn scan(&self, key: &str, recursive: bool, since_index: u64) -> Result<Vec<Arc<Event>>> {
        if let Some(evicted) = self.last_evicted {
            if since_index <= evicted {
                return Err(WatchError::EventIndexCleared {
                    requested: since_index,
                    oldest: self
                        .oldest_index()
                        .unwrap_or_else(|| evicted.saturating_add(1)),
                    current: self.newest_index().unwrap_or(evicted),
                });
            }
        }

        match self.newest_index() {
            Some(newest) if since_index <= newest => {}
            _ => return Ok(Vec::new()),
        }

        Ok(self
            .iter()
            .filter(|e| e.index() >= since_index)
            .filter(|e| e.key() == key || (recursive && is_descendant(e.key(), key)))
            .cloned()
            .collect())
    }

    /// Resident events in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> + '_ {
        let len = self.events.len();
        (0..len).map(move |i| &self.events[(self.front + i) % len])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the oldest resident event.
    pub fn oldest_index(&self) -> Option<u64> {
        self.events.get(self.front).map(|e| e.index())
    }

    /// Index of the newest resident event.
    pub fn newest_index(&self) -> Option<u64> {
        if self.events.is_empty() {
            return None;
        }
        let back = (self.front + self.events.len() - 1) % self.events.len();
        Some(self.events[back].index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Action;

    fn indices(events: &[Arc<Event>]) -> Vec<u64> {
        events.iter().map(|e| e.index()).collect()
    }

    fn sample_history() -> EventHistory {
        let mut eh = EventHistory::new(100).unwrap();
        eh.add_event(Event::new(Action::Create, "/foo", 1, 1));
        eh.add_event(Event::new(Action::Create, "/foo/bar", 2, 2));
        eh.add_event(Event::new(Action::Create, "/foo/foo", 3, 3));
        eh.add_event(Event::new(Action::Create, "/foo/bar/bar", 4, 4));
        eh.add_event(Event::new(Action::Create, "/foo/foo/foo", 5, 5));
        eh.add_event(Event::new(Action::Set, "/foo", 6, 6));
        eh.add_event(Event::new(Action::Set, "/foo/foo", 7, 7));
        eh
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            EventHistory::new(0),
            Err(WatchError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_event_queue_keeps_most_recent() {
        let mut eh = EventHistory::new(100).unwrap();
        for i in 0..200u64 {
            eh.add_event(Event::new(Action::Create, "/foo", i, i));
        }

        assert_eq!(eh.len(), 100);
        let resident: Vec<u64> = eh.iter().map(|e| e.index()).collect();
        assert_eq!(resident, (100..200).collect::<Vec<_>>());
        assert_eq!(eh.oldest_index(), Some(100));
        assert_eq!(eh.newest_index(), Some(199));
    }

    #[test]
    fn test_scan_exact() {
        let eh = sample_history();
        assert_eq!(indices(&eh.scan("/foo", false, 1).unwrap()), vec![1, 6]);
        assert_eq!(indices(&eh.scan("/foo/foo", false, 1).unwrap()), vec![3, 7]);
        assert_eq!(indices(&eh.scan("/foo/bar", false, 1).unwrap()), vec![2]);
    }

    #[test]
    fn test_scan_recursive() {
        let eh = sample_history();
        assert_eq!(
            indices(&eh.scan("/foo/foo", true, 1).unwrap()),
            vec![3, 5, 7]
        );
        // Ancestors never match.
        assert_eq!(indices(&eh.scan("/foo/foo/foo", true, 1).unwrap()), vec![5]);
    }

    #[test]
    fn test_scan_past_newest_is_empty() {
        let eh = sample_history();
        let events = eh.scan("/foo/bar", true, 8).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_scan_respects_since_index() {
        let eh = sample_history();
        assert_eq!(indices(&eh.scan("/foo", false, 2).unwrap()), vec![6]);
        assert_eq!(indices(&eh.scan("/foo", true, 6).unwrap()), vec![6, 7]);
    }

    #[test]
    fn test_scan_without_eviction_never_errors() {
        let eh = sample_history();
        assert_eq!(indices(&eh.scan("/foo", false, 0).unwrap()), vec![1, 6]);
    }

    #[test]
    fn test_scan_cleared_index() {
        let mut eh = EventHistory::new(3).unwrap();
        for i in 1..=5u64 {
            eh.add_event(Event::new(Action::Set, "/foo", i, i));
        }
        // 1 and 2 evicted; 3..=5 resident.
        match eh.scan("/foo", false, 2) {
            Err(WatchError::EventIndexCleared {
                requested,
                oldest,
                current,
            }) => {
                assert_eq!(requested, 2);
                assert_eq!(oldest, 3);
                assert_eq!(current, 5);
            }
            other => panic!("Expected EventIndexCleared, got {:?}", other),
        }
        assert_eq!(indices(&eh.scan("/foo", false, 3).unwrap()), vec![3, 4, 5]);
    }

    #[test]
    fn test_scan_cleared_at_max_index() {
        let mut eh = EventHistory::new(1).unwrap();
        eh.add_event(Event::new(Action::Set, "/foo", u64::MAX, u64::MAX));
        eh.add_event(Event::new(Action::Set, "/foo", u64::MAX, u64::MAX));
        match eh.scan("/foo", false, u64::MAX) {
            Err(WatchError::EventIndexCleared { oldest, current, .. }) => {
                assert_eq!(oldest, u64::MAX);
                assert_eq!(current, u64::MAX);
            }
            other => panic!("Expected EventIndexCleared, got {:?}", other),
        }
    }

    #[test]
    fn test_full_queue_continuous_catch_up() {
        let mut eh = EventHistory::new(10).unwrap();
        for i in 1..1000u64 {
            eh.add_event(Event::new(Action::Create, "/foo", i, i));
            let events = eh.scan("/foo", true, i - 1).unwrap();
            assert!(!events.is_empty(), "scan from {} found nothing", i - 1);
            if i > 1 {
                assert_eq!(events[0].index(), i - 1);
            }
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let mut eh = sample_history();
        let copy = eh.clone();
        eh.add_event(Event::new(Action::Set, "/foo", 8, 8));

        assert_eq!(copy.len(), 7);
        assert_eq!(copy.capacity(), 100);
        assert_eq!(copy.newest_index(), Some(7));
        assert_eq!(eh.newest_index(), Some(8));
    }
}
