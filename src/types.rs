//! Shared key and time helpers.

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// This timestamp shifted forward by `duration`.
    pub fn after(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Check that a key is an absolute, slash-delimited path in canonical form.
///
/// Trailing and repeated slashes are rejected: `notify` walks canonical
/// prefixes only, so such a key could never be reached.
pub fn validate_key(key: &str) -> Result<()> {
    if !key.starts_with('/') || normalize_key(key) != key {
        return Err(WatchError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Turn a raw key (as found in a request path) into an absolute key.
///
/// Empty segments are collapsed, so `foo//bar/` becomes `/foo/bar`.
pub fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len() + 1);
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        key.push('/');
        key.push_str(segment);
    }
    if key.is_empty() {
        key.push('/');
    }
    key
}

/// Every path from the root down to `key`, inclusive.
///
/// `/foo/bar` yields `/`, `/foo`, `/foo/bar`. The root is visited once
/// even when `key` is `/`.
pub fn path_prefixes(key: &str) -> Vec<String> {
    let mut prefixes = vec!["/".to_string()];
    let mut current = String::with_capacity(key.len());
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

/// True if `key` lies strictly below `ancestor`.
pub fn is_descendant(key: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return key.len() > 1 && key.starts_with('/');
    }
    key.len() > ancestor.len()
        && key.starts_with(ancestor)
        && key.as_bytes()[ancestor.len()] == b'/'
}
