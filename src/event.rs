//! The event object model.
//!
//! An [`Event`] records one mutation of the key-value tree: what kind of
//! mutation it was, the affected node's post-mutation state, and the
//! store-wide index assigned to it. Events are immutable once built and are
//! shared as `Arc<Event>` between the history and watcher mailboxes.

use crate::error::Result;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of mutation an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Set,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
    Update,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Set => "set",
            Action::Delete => "delete",
            Action::Expire => "expire",
            Action::CompareAndSwap => "compareAndSwap",
            Action::CompareAndDelete => "compareAndDelete",
            Action::Update => "update",
        }
    }

    /// Whether this action removes the node it names.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Action::Delete | Action::Expire | Action::CompareAndDelete
        )
    }

    /// Name used in the externalized response.
    fn response_name(&self) -> &'static str {
        match self {
            Action::Create | Action::CompareAndSwap => "testAndSet",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a node after a mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub key: String,
    pub value: Option<String>,
    pub dir: bool,
    /// Remaining time-to-live in seconds.
    pub ttl: Option<i64>,
    pub expiration: Option<Timestamp>,
    /// Child listing, populated for directory nodes.
    pub nodes: Vec<NodeSnapshot>,
    pub created_index: u64,
    pub modified_index: u64,
}

impl NodeSnapshot {
    pub fn new(key: impl Into<String>, created_index: u64, modified_index: u64) -> Self {
        Self {
            key: key.into(),
            value: None,
            dir: false,
            ttl: None,
            expiration: None,
            nodes: Vec::new(),
            created_index,
            modified_index,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Give the node a TTL; expiration is computed from the current time.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl.as_secs() as i64);
        self.expiration = Some(Timestamp::now().after(ttl));
        self
    }

    /// Mark the node as a directory with the given children.
    pub fn with_children(mut self, nodes: Vec<NodeSnapshot>) -> Self {
        self.dir = true;
        self.nodes = nodes;
        self
    }

    fn to_response(&self, action: Action, prev_value: Option<String>, index: u64) -> Response {
        let new_key = action == Action::Set && prev_value.is_none();
        Response {
            action: action.response_name().to_string(),
            key: self.key.clone(),
            value: self.value.clone(),
            prev_value,
            new_key,
            dir: self.dir,
            expiration: self.expiration,
            ttl: self.ttl,
            index,
        }
    }
}

/// One mutation of the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub action: Action,
    pub node: NodeSnapshot,
    /// State of the node before the mutation, if it existed.
    pub prev_node: Option<NodeSnapshot>,
}

impl Event {
    pub fn new(
        action: Action,
        key: impl Into<String>,
        created_index: u64,
        modified_index: u64,
    ) -> Self {
        Self {
            action,
            node: NodeSnapshot::new(key, created_index, modified_index),
            prev_node: None,
        }
    }

    /// Build an event around an existing node snapshot.
    pub fn from_node(action: Action, node: NodeSnapshot) -> Self {
        Self {
            action,
            node,
            prev_node: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.node.value = Some(value.into());
        self
    }

    pub fn with_prev_node(mut self, prev: NodeSnapshot) -> Self {
        self.prev_node = Some(prev);
        self
    }

    /// Ordering index of the event (the node's modified index).
    pub fn index(&self) -> u64 {
        self.node.modified_index
    }

    pub fn key(&self) -> &str {
        &self.node.key
    }

    /// Whether the event removed a directory, i.e. a whole subtree.
    pub fn removes_subtree(&self) -> bool {
        self.action.is_removal() && self.node.dir
    }

    /// Externalize the event for the network layer.
    ///
    /// A non-zero `current_index` replaces the event's own index so callers
    /// can see how far the store has moved on since the event happened.
    pub fn response(&self, current_index: u64) -> EventResponse {
        let index = if current_index != 0 {
            current_index
        } else {
            self.index()
        };
        let prev_value = self.prev_node.as_ref().and_then(|p| p.value.clone());

        if self.node.dir {
            let listing = self
                .node
                .nodes
                .iter()
                .map(|child| child.to_response(self.action, None, index))
                .collect();
            EventResponse::Listing(listing)
        } else {
            EventResponse::Single(self.node.to_response(self.action, prev_value, index))
        }
    }
}

/// Externalized view of a single node change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub action: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_key: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    pub index: u64,
}

/// What an event looks like to a client: one node, or a directory listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventResponse {
    Single(Response),
    Listing(Vec<Response>),
}

impl EventResponse {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
