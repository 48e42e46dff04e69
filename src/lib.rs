//! # Watch Hub
//!
//! Change notification for a hierarchical key-value store. Clients watch a
//! key (or everything under it) and are told about mutations as they
//! happen; a client that subscribes slightly late can catch up from a
//! bounded history of recent events.
//!
//! ## Core Concepts
//!
//! - **Events**: Immutable records of one mutation, ordered by store index
//! - **History**: Fixed-capacity ring of recent events, scanned for catch-up
//! - **Watchers**: One-slot mailboxes, single-shot or streaming, exact or recursive
//! - **Hub**: Registry of watchers by path; publishes each event along its path
//!
//! ## Example
//!
//! ```ignore
//! use watchhub::{Action, Event, WatcherHub};
//!
//! let hub = WatcherHub::with_capacity(1000)?;
//!
//! // Wait for the next change anywhere under /config
//! let watcher = hub.watch("/config", true, false, 0)?;
//!
//! // The store publishes a mutation
//! hub.notify(Event::new(Action::Set, "/config/port", 7, 7).with_value("8080"));
//!
//! let message = watcher.recv()?;
//! assert_eq!(message.events()[0].key(), "/config/port");
//! ```

pub mod adapter;
pub mod error;
pub mod event;
pub mod history;
pub mod hub;
pub mod types;
pub mod watcher;

// Re-exports
pub use adapter::{render, serve_once, serve_stream, WatchRequest};
pub use error::{Result, WatchError};
pub use event::{Action, Event, EventResponse, NodeSnapshot, Response};
pub use history::EventHistory;
pub use hub::{HubConfig, WatcherHub};
pub use types::Timestamp;
pub use watcher::{WatchMessage, Watcher};
