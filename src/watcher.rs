//! Per-subscription state and the subscriber-side handle.

use crate::event::Event;
use crate::hub::HubShared;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// What a watcher's mailbox carries.
#[derive(Clone, Debug)]
pub enum WatchMessage {
    /// A live event delivered by `notify`.
    Event(Arc<Event>),
    /// Historical events served at subscription time, oldest first.
    Batch(Vec<Arc<Event>>),
}

impl WatchMessage {
    /// The events in this message, in index order.
    pub fn events(&self) -> &[Arc<Event>] {
        match self {
            WatchMessage::Event(e) => std::slice::from_ref(e),
            WatchMessage::Batch(events) => events,
        }
    }

    pub fn into_events(self) -> Vec<Arc<Event>> {
        match self {
            WatchMessage::Event(e) => vec![e],
            WatchMessage::Batch(events) => events,
        }
    }
}

/// Outcome of offering an event to one watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Filter accepted and the event is in the mailbox.
    Delivered,
    /// Filter rejected the event.
    Skipped,
    /// Filter accepted but the mailbox was full.
    Dropped,
    /// Nobody is listening anymore.
    Disconnected,
}

/// Subscription state shared between the hub's registry and the handle.
pub(crate) struct WatcherState {
    pub(crate) id: u64,
    pub(crate) key: String,
    pub(crate) recursive: bool,
    pub(crate) stream: bool,
    pub(crate) since_index: u64,
    /// Dropped once the watcher leaves the registry, closing the channel.
    sender: Mutex<Option<Sender<WatchMessage>>>,
    removed: AtomicBool,
    /// Position in the registry list; only touched under the hub lock.
    pub(crate) slot: AtomicUsize,
}

impl WatcherState {
    pub(crate) fn new(
        id: u64,
        key: &str,
        recursive: bool,
        stream: bool,
        since_index: u64,
        sender: Sender<WatchMessage>,
    ) -> Self {
        Self {
            id,
            key: key.to_string(),
            recursive,
            stream,
            since_index,
            sender: Mutex::new(Some(sender)),
            removed: AtomicBool::new(false),
            slot: AtomicUsize::new(0),
        }
    }

    /// Offer an event to this watcher without blocking.
    ///
    /// `exact` says whether the event's key is the watched key itself;
    /// `deleted` forces acceptance for watchers under a removed subtree.
    pub(crate) fn try_deliver(&self, event: &Arc<Event>, exact: bool, deleted: bool) -> Delivery {
        if !(self.recursive || exact || deleted) || event.index() < self.since_index {
            return Delivery::Skipped;
        }

        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Delivery::Disconnected;
        };
        match sender.try_send(WatchMessage::Event(Arc::clone(event))) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }

    /// Hand a catch-up batch to a watcher that never joins the registry.
    ///
    /// The mailbox is fresh, so the send cannot find it full.
    pub(crate) fn serve_batch(&self, events: Vec<Arc<Event>>) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.try_send(WatchMessage::Batch(events));
        }
        self.mark_removed();
    }

    /// Flip to removed. True only for the call that made the transition.
    pub(crate) fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Drop the sending side. Messages already queued stay readable.
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }
}

/// Handle to one subscription.
///
/// Receive events with [`recv`](Watcher::recv) and friends. Once the
/// subscription ends (single-shot delivery, catch-up batch, or
/// [`detach`](Watcher::detach)) the channel closes after any queued
/// message is drained. Dropping the handle detaches it.
pub struct Watcher {
    state: Arc<WatcherState>,
    receiver: Receiver<WatchMessage>,
    hub: Weak<HubShared>,
}

impl Watcher {
    pub(crate) fn new(
        state: Arc<WatcherState>,
        receiver: Receiver<WatchMessage>,
        hub: Weak<HubShared>,
    ) -> Self {
        Self {
            state,
            receiver,
            hub,
        }
    }

    /// Receive the next message (blocking).
    pub fn recv(&self) -> Result<WatchMessage, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> Result<WatchMessage, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<WatchMessage, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }

    pub fn is_recursive(&self) -> bool {
        self.state.recursive
    }

    pub fn is_streaming(&self) -> bool {
        self.state.stream
    }

    pub fn since_index(&self) -> u64 {
        self.state.since_index
    }

    /// Whether the hub still holds this watcher for live events.
    pub fn is_registered(&self) -> bool {
        !self.state.is_removed()
    }

    /// Leave the registry. Safe to call repeatedly and from any thread.
    pub fn detach(&self) {
        if self.state.is_removed() {
            return;
        }
        match self.hub.upgrade() {
            Some(hub) => hub.detach(&self.state),
            None => {
                self.state.mark_removed();
                self.state.close();
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.state.id)
            .field("key", &self.state.key)
            .field("recursive", &self.state.recursive)
            .field("stream", &self.state.stream)
            .field("since_index", &self.state.since_index)
            .field("registered", &self.is_registered())
            .finish()
    }
}
