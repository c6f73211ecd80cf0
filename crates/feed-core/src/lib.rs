//! Live activity feed synchronization core.
//!
//! A feed is one snapshot fetch plus a live event stream, reconciled into a
//! single deduplicated, newest-first sequence. This crate owns the merge
//! rules, the reconciler lifecycle, the reconnecting stream connector, and
//! the reactive store consumers read from. Transports plug in through
//! [`SnapshotLoad`] and [`StreamTransport`].

/// Command/view channel primitives.
pub mod channel;
/// Reconnecting stream connector and the transport seam.
pub mod connector;
/// Stable error types for transport, decode, and snapshot failures.
pub mod error;
/// Deduplicated, bounded event sequence.
pub mod feed;
/// Feed actor, mount handle, and the snapshot loader seam.
pub mod reconciler;
/// Backoff policy used by the connector.
pub mod retry;
/// Reconciler lifecycle state machine.
pub mod state_machine;
/// Read-only reactive projection for views.
pub mod store;
/// Event and status types.
pub mod types;
/// Event-stream framing and event decoding.
pub mod wire;

#[cfg(test)]
mod testing;

pub use channel::FeedChannels;
pub use connector::{
    ByteStream, ConnectorConfig, ConnectorEvent, StreamConnector, StreamSignal, StreamTransport,
};
pub use error::{
    DecodeError, FeedChannelError, InvalidTransition, SnapshotError, SnapshotFailure, StoreClosed,
    TransportError,
};
pub use feed::{DEFAULT_MAX_ITEMS, FeedState, MergeOutcome};
pub use reconciler::{FeedConfig, FeedHandle, SnapshotLoad, mount};
pub use retry::RetryPolicy;
pub use state_machine::{ReconcilerPhase, ReconcilerStateMachine, StreamDisposition};
pub use store::{FeedStore, FeedView};
pub use types::{
    ConnectionPhase, ConnectionState, Event, FeedCommand, FeedStatus, StreamStatus,
};
pub use wire::{MAX_LINE_BYTES, SseDecoder, SseFrame, decode_event};
