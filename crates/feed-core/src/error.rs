use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::ReconcilerPhase;

/// Failure of the live stream transport. Always retriable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("stream connect failed: {0}")]
    Connect(String),
    /// The server answered the stream request with a non-2xx status.
    #[error("stream request rejected with HTTP {0}")]
    Status(u16),
    /// Reading from an open stream failed.
    #[error("stream read failed: {0}")]
    Read(String),
    /// The server ended the stream.
    #[error("stream ended by server")]
    Ended,
}

/// Failure to decode one stream frame. The frame is dropped, the stream stays up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// `data` was not a JSON event.
    #[error("frame is not a valid event: {0}")]
    InvalidEvent(String),
    /// The event decoded but carried an empty id.
    #[error("event has an empty id")]
    EmptyId,
    /// A line outgrew the decoder's buffer limit and was skipped.
    #[error("stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Why a snapshot load failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFailure {
    Network,
    Server,
    Decode,
}

impl SnapshotFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Server => "server",
            Self::Decode => "decode",
        }
    }
}

/// Terminal snapshot failure; surfaced to the user until an explicit reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Network(String),
    #[error("snapshot request returned HTTP {status}")]
    Server {
        status: u16,
        /// `detail` string from a JSON error body, when the server sent one.
        detail: Option<String>,
    },
    #[error("snapshot body could not be decoded: {0}")]
    Decode(String),
}

impl SnapshotError {
    /// Failure class reported to the store.
    pub fn reason(&self) -> SnapshotFailure {
        match self {
            Self::Network(_) => SnapshotFailure::Network,
            Self::Server { .. } => SnapshotFailure::Server,
            Self::Decode(_) => SnapshotFailure::Decode,
        }
    }

    /// Reason string shown in the blocking error panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.trim().to_owned(),
            Self::Server { status, .. } => format!("Unable to load feed (HTTP {status})"),
            Self::Network(_) => "Unable to load feed: network unavailable".to_owned(),
            Self::Decode(_) => "Unable to load feed: unexpected response".to_owned(),
        }
    }
}

/// A reconciler state transition was requested from a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: cannot run '{action}' while feed is {current:?}")]
pub struct InvalidTransition {
    /// Stable machine-readable code.
    pub code: &'static str,
    pub current: ReconcilerPhase,
    pub action: String,
}

impl InvalidTransition {
    pub fn new(current: ReconcilerPhase, action: impl Into<String>) -> Self {
        Self {
            code: "invalid_state_transition",
            current,
            action: action.into(),
        }
    }
}

/// Errors returned by feed command channel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedChannelError {
    /// The feed task has exited (unmounted or panicked).
    #[error("feed is no longer mounted")]
    Unmounted,
}

/// The reconciler dropped its side of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("feed store closed")]
pub struct StoreClosed;
