//! The watcher hub: subscription registry plus event history.
//!
//! Watchers register at an exact path. When an event for `/foo/bar` is
//! published, the hub visits `/`, `/foo` and `/foo/bar` in turn and offers
//! the event to every watcher registered at each of those paths; each
//! watcher's own filter (recursive or exact, since-index) decides.

use crate::error::Result;
use crate::event::Event;
use crate::history::EventHistory;
use crate::types::{is_descendant, path_prefixes, validate_key};
use crate::watcher::{Delivery, Watcher, WatcherState};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Default number of events kept for catch-up.
const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Hub configuration.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// How many recent events to keep for catch-up.
    pub history_capacity: usize,

    /// Also deliver removal of a directory to watchers registered anywhere
    /// below it. Leave off when the store already publishes one event per
    /// removed descendant.
    pub fan_out_subtree_deletes: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            fan_out_subtree_deletes: false,
        }
    }
}

/// Watchers registered at one path, in registration order.
///
/// Removal leaves a hole so iteration over later slots is unaffected;
/// holes are squeezed out by `compact` between iterations.
#[derive(Default)]
struct WatcherList {
    slots: Vec<Option<Arc<WatcherState>>>,
    live: usize,
}

impl WatcherList {
    fn push(&mut self, watcher: Arc<WatcherState>) {
        watcher.slot.store(self.slots.len(), Ordering::Relaxed);
        self.slots.push(Some(watcher));
        self.live += 1;
    }

    fn get(&self, slot: usize) -> Option<Arc<WatcherState>> {
        self.slots.get(slot).and_then(|w| w.clone())
    }

    /// Remove the watcher with `id` at `slot`, if it is still there.
    fn remove(&mut self, slot: usize, id: u64) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) if entry.as_ref().is_some_and(|w| w.id == id) => {
                *entry = None;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn compact(&mut self) {
        if self.slots.len() - self.live <= self.live {
            return;
        }
        self.slots.retain(Option::is_some);
        for (slot, watcher) in self.slots.iter().flatten().enumerate() {
            watcher.slot.store(slot, Ordering::Relaxed);
        }
    }
}

/// Everything guarded by the hub lock.
struct HubState {
    watchers: HashMap<String, WatcherList>,
    history: EventHistory,
}

/// Hub internals shared with watcher handles for detaching.
pub(crate) struct HubShared {
    state: Mutex<HubState>,
    /// Number of registered watchers; readable without the lock.
    count: AtomicUsize,
    next_id: AtomicU64,
    config: HubConfig,
}

impl HubShared {
    /// Remove a watcher from the registry. No-op if already removed.
    pub(crate) fn detach(&self, watcher: &WatcherState) {
        let mut state = self.state.lock();
        if !watcher.mark_removed() {
            return;
        }

        let slot = watcher.slot.load(Ordering::Relaxed);
        let now_empty = match state.watchers.get_mut(&watcher.key) {
            Some(list) => {
                list.remove(slot, watcher.id);
                list.compact();
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.watchers.remove(&watcher.key);
        }

        watcher.close();
        self.count.fetch_sub(1, Ordering::AcqRel);
        debug!(id = watcher.id, key = %watcher.key, "watcher detached");
    }

    /// Offer `event` to every watcher registered exactly at `path`.
    fn notify_watchers(&self, state: &mut HubState, event: &Arc<Event>, path: &str, deleted: bool) {
        let Some(list) = state.watchers.get_mut(path) else {
            return;
        };

        let exact = event.key() == path;
        let mut removed = 0;

        for slot in 0..list.slots.len() {
            let Some(watcher) = list.get(slot) else {
                continue;
            };

            match watcher.try_deliver(event, exact, deleted) {
                Delivery::Delivered if watcher.stream => {}
                Delivery::Delivered => {
                    if watcher.mark_removed() {
                        list.remove(slot, watcher.id);
                        watcher.close();
                        removed += 1;
                    }
                }
                Delivery::Dropped => {
                    debug!(
                        id = watcher.id,
                        key = %watcher.key,
                        index = event.index(),
                        "mailbox full, event dropped"
                    );
                }
                Delivery::Disconnected => {
                    if watcher.mark_removed() {
                        list.remove(slot, watcher.id);
                        watcher.close();
                        removed += 1;
                        debug!(id = watcher.id, key = %watcher.key, "pruned disconnected watcher");
                    }
                }
                Delivery::Skipped => {}
            }
        }

        let now_empty = list.is_empty();
        if now_empty {
            state.watchers.remove(path);
        } else {
            list.compact();
        }

        if removed > 0 {
            self.count.fetch_sub(removed, Ordering::AcqRel);
        }
    }
}

/// Subscription registry with an embedded event history.
pub struct WatcherHub {
    shared: Arc<HubShared>,
}

impl WatcherHub {
    /// Create a hub from a configuration.
    pub fn new(config: HubConfig) -> Result<Self> {
        let history = EventHistory::new(config.history_capacity)?;
        Ok(Self::from_parts(history, config))
    }

    /// Create a hub with default settings and the given history capacity.
    pub fn with_capacity(history_capacity: usize) -> Result<Self> {
        Self::new(HubConfig {
            history_capacity,
            ..Default::default()
        })
    }

    fn from_parts(history: EventHistory, config: HubConfig) -> Self {
        Self {
            shared: Arc::new(HubShared {
                state: Mutex::new(HubState {
                    watchers: HashMap::new(),
                    history,
                }),
                count: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Subscribe to changes at `key` (and below it if `recursive`).
    ///
    /// With a non-zero `since_index`, events already in the history at or
    /// after that index are returned at once as a single batch and the
    /// watcher is not registered for live events, even when `stream` is
    /// set. Otherwise the watcher is registered and waits for `notify`;
    /// non-streaming watchers leave the registry after their first event.
    ///
    /// Fails with `EventIndexCleared` if `since_index` reaches back past
    /// what the history still holds.
    pub fn watch(&self, key: &str, recursive: bool, stream: bool, since_index: u64) -> Result<Watcher> {
        validate_key(key)?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(1);
        let watcher = Arc::new(WatcherState::new(
            id,
            key,
            recursive,
            stream,
            since_index,
            sender,
        ));

        let mut state = self.shared.state.lock();

        if since_index != 0 {
            let events = state.history.scan(key, recursive, since_index).map_err(|e| {
                debug!(key, since_index, error = %e, "watch rejected");
                e
            })?;

            if !events.is_empty() {
                drop(state);
                debug!(id, key, since_index, count = events.len(), "served catch-up batch");
                watcher.serve_batch(events);
                return Ok(Watcher::new(watcher, receiver, Weak::new()));
            }
        }

        state
            .watchers
            .entry(key.to_string())
            .or_default()
            .push(Arc::clone(&watcher));
        self.shared.count.fetch_add(1, Ordering::AcqRel);
        drop(state);

        debug!(id, key, recursive, stream, since_index, "watcher registered");
        Ok(Watcher::new(watcher, receiver, Arc::downgrade(&self.shared)))
    }

    /// Record `event` in the history and deliver it to interested watchers.
    ///
    /// Callers publish events in increasing index order. Delivery never
    /// blocks: a watcher whose mailbox is still full misses the event.
    pub fn notify(&self, event: impl Into<Arc<Event>>) -> Arc<Event> {
        let mut state = self.shared.state.lock();
        let event = state.history.add_event(event);
        trace!(key = event.key(), index = event.index(), action = %event.action, "notify");

        for path in path_prefixes(event.key()) {
            self.shared.notify_watchers(&mut state, &event, &path, false);
        }

        if self.shared.config.fan_out_subtree_deletes && event.removes_subtree() {
            let below: Vec<String> = state
                .watchers
                .keys()
                .filter(|path| is_descendant(path, event.key()))
                .cloned()
                .collect();
            for path in below {
                self.shared.notify_watchers(&mut state, &event, &path, true);
            }
        }

        event
    }

    /// A new hub carrying a copy of this hub's history and no watchers.
    pub fn clone_static(&self) -> WatcherHub {
        let history = self.shared.state.lock().history.clone();
        Self::from_parts(history, self.shared.config.clone())
    }

    /// Number of registered watchers.
    pub fn count(&self) -> usize {
        self.shared.count.load(Ordering::Acquire)
    }

    /// Index of the newest event seen, or 0 before the first one.
    pub fn current_index(&self) -> u64 {
        self.shared.state.lock().history.newest_index().unwrap_or(0)
    }

    /// Paths that currently have at least one watcher, sorted.
    pub fn watched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.shared.state.lock().watchers.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Copy of the current event history.
    pub fn history(&self) -> EventHistory {
        self.shared.state.lock().history.clone()
    }

    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }
}
