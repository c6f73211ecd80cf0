use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One task-comment activity record as delivered by the backend.
///
/// Only `id` is interpreted by the core. `created_at` is carried for display
/// and the remaining fields travel through untouched in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Server-assigned id, unique within the feed.
    pub id: String,
    /// Server timestamp string. Display hint only, never used for ordering.
    #[serde(default)]
    pub created_at: String,
    /// Everything else the server sent, passed through unmodified.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Build an event with an empty payload.
    pub fn new(id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            payload: Map::new(),
        }
    }

    /// Attach one payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Comment body.
    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    /// Display name of the agent that wrote the comment.
    pub fn agent_name(&self) -> Option<&str> {
        self.str_field("agent_name")
    }

    pub fn agent_role(&self) -> Option<&str> {
        self.str_field("agent_role")
    }

    pub fn board_name(&self) -> Option<&str> {
        self.str_field("board_name")
    }

    pub fn task_title(&self) -> Option<&str> {
        self.str_field("task_title")
    }

    /// Read a string payload field, ignoring nulls and non-string values.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Presentation status of the feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// Snapshot has not resolved yet.
    Loading,
    /// Live with at least one event.
    Ready,
    /// Live with zero events.
    Empty,
    /// Snapshot failed; nothing is shown until reload.
    Error,
}

/// Lifecycle of the single push connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closed,
}

/// Connector-owned connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// Current phase of the live connection.
    pub phase: ConnectionPhase,
    /// Consecutive failed attempts since the last stable connection.
    pub attempt: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Closed,
            attempt: 0,
        }
    }
}

/// Stream health summary exposed next to the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamStatus {
    /// Phase of the push connection.
    pub phase: ConnectionPhase,
    /// Backoff attempt counter reported by the connector.
    pub attempt: u32,
    /// Delay before the next reconnect, while one is scheduled.
    pub retry_in_ms: Option<u64>,
    /// Reconnects scheduled since mount (or since the last reload).
    pub reconnects: u64,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Closed,
            attempt: 0,
            retry_in_ms: None,
            reconnects: 0,
        }
    }
}

/// Commands accepted by a mounted feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Drop the current session and start over with a fresh snapshot.
    Reload,
}
