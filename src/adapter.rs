//! Transport-free watch request handling.
//!
//! The network layer parses a request into a [`WatchRequest`], hands it to
//! [`serve_once`] or [`serve_stream`], and writes the returned JSON bodies
//! to its client.

use crate::error::{Result, WatchError};
use crate::event::EventResponse;
use crate::hub::WatcherHub;
use crate::types::normalize_key;
use crate::watcher::{WatchMessage, Watcher};
use crossbeam_channel::RecvTimeoutError;
use std::time::Duration;
use tracing::debug;

/// A parsed watch request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRequest {
    pub key: String,
    /// 0 means live events only.
    pub since_index: u64,
    pub recursive: bool,
    pub stream: bool,
}

impl WatchRequest {
    /// Build a request from raw transport values.
    ///
    /// `raw_key` may be relative (`foo/bar`); `index` is the optional
    /// starting index as sent by the client.
    pub fn parse(raw_key: &str, index: Option<&str>, recursive: bool, stream: bool) -> Result<Self> {
        let since_index = match index.map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| WatchError::InvalidIndex(raw.to_string()))?,
        };

        Ok(Self {
            key: normalize_key(raw_key),
            since_index,
            recursive,
            stream,
        })
    }

    fn watch(&self, hub: &WatcherHub) -> Result<Watcher> {
        hub.watch(&self.key, self.recursive, self.stream, self.since_index)
    }
}

/// Serialize one mailbox message alongside the store's current index.
///
/// A live event becomes a single response; a catch-up batch becomes an
/// array with one response per event.
pub fn render(message: &WatchMessage, current_index: u64) -> Result<String> {
    match message {
        WatchMessage::Event(event) => event.response(current_index).to_json(),
        WatchMessage::Batch(events) => {
            let responses: Vec<EventResponse> =
                events.iter().map(|e| e.response(current_index)).collect();
            Ok(serde_json::to_string(&responses)?)
        }
    }
}

/// Watch once and wait for exactly one message.
///
/// Returns `Ok(None)` if `timeout` elapses first; the watcher is detached
/// in that case.
pub fn serve_once(
    hub: &WatcherHub,
    request: &WatchRequest,
    timeout: Option<Duration>,
) -> Result<Option<String>> {
    let watcher = request.watch(hub)?;

    let message = match timeout {
        Some(timeout) => match watcher.recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => {
                debug!(key = %request.key, "watch timed out");
                watcher.detach();
                return Ok(None);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(WatchError::WatcherClosed),
        },
        None => watcher.recv().map_err(|_| WatchError::WatcherClosed)?,
    };

    render(&message, hub.current_index()).map(Some)
}

/// Keep delivering messages to `sink` until it returns `false` or the
/// subscription ends. Returns how many messages were handed to the sink.
pub fn serve_stream<F>(hub: &WatcherHub, request: &WatchRequest, mut sink: F) -> Result<usize>
where
    F: FnMut(String) -> bool,
{
    let watcher = request.watch(hub)?;
    let mut sent = 0;

    while let Ok(message) = watcher.recv() {
        let body = render(&message, hub.current_index())?;
        sent += 1;
        if !sink(body) {
            debug!(key = %request.key, sent, "stream client gone");
            break;
        }
    }

    watcher.detach();
    Ok(sent)
}
