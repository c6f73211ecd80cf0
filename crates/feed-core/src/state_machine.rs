use serde::{Deserialize, Serialize};

use crate::{error::InvalidTransition, types::FeedStatus};

/// Lifecycle phase of a mounted feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReconcilerPhase {
    /// Created but not started.
    Initializing,
    /// Snapshot in flight; stream events are buffered.
    SnapshotPending,
    /// Snapshot applied; stream events are merged as they arrive.
    Live,
    /// Snapshot failed. Terminal until an explicit reload.
    SnapshotFailed,
    /// The owning view went away. Nothing is published after this.
    Unmounted,
}

/// What to do with a stream event in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDisposition {
    Buffer,
    Apply,
    Drop,
}

#[derive(Debug, Clone)]
pub struct ReconcilerStateMachine {
    phase: ReconcilerPhase,
}

impl Default for ReconcilerStateMachine {
    fn default() -> Self {
        Self {
            phase: ReconcilerPhase::Initializing,
        }
    }
}

impl ReconcilerStateMachine {
    pub fn phase(&self) -> ReconcilerPhase {
        self.phase
    }

    /// Mount (or reload): snapshot requested, stream started.
    pub fn begin_session(&mut self) -> Result<ReconcilerPhase, InvalidTransition> {
        self.transition_from_any_of(
            &[
                ReconcilerPhase::Initializing,
                ReconcilerPhase::SnapshotPending,
                ReconcilerPhase::Live,
                ReconcilerPhase::SnapshotFailed,
            ],
            ReconcilerPhase::SnapshotPending,
            "begin_session",
        )
    }

    pub fn on_snapshot_loaded(&mut self) -> Result<ReconcilerPhase, InvalidTransition> {
        self.transition_from_any_of(
            &[ReconcilerPhase::SnapshotPending],
            ReconcilerPhase::Live,
            "snapshot_loaded",
        )
    }

    pub fn on_snapshot_failed(&mut self) -> Result<ReconcilerPhase, InvalidTransition> {
        self.transition_from_any_of(
            &[ReconcilerPhase::SnapshotPending],
            ReconcilerPhase::SnapshotFailed,
            "snapshot_failed",
        )
    }

    /// Unmount is accepted from every phase and is idempotent.
    pub fn unmount(&mut self) -> ReconcilerPhase {
        self.phase = ReconcilerPhase::Unmounted;
        self.phase
    }

    pub fn stream_disposition(&self) -> StreamDisposition {
        match self.phase {
            ReconcilerPhase::SnapshotPending => StreamDisposition::Buffer,
            ReconcilerPhase::Live => StreamDisposition::Apply,
            ReconcilerPhase::Initializing
            | ReconcilerPhase::SnapshotFailed
            | ReconcilerPhase::Unmounted => StreamDisposition::Drop,
        }
    }

    /// Whether a dropped stream should be reconnected in this phase.
    pub fn wants_stream(&self) -> bool {
        matches!(
            self.phase,
            ReconcilerPhase::SnapshotPending | ReconcilerPhase::Live
        )
    }

    /// Store status for this phase given the current number of visible events.
    pub fn status(&self, visible_events: usize) -> FeedStatus {
        match self.phase {
            ReconcilerPhase::Initializing | ReconcilerPhase::SnapshotPending => FeedStatus::Loading,
            ReconcilerPhase::Live if visible_events == 0 => FeedStatus::Empty,
            ReconcilerPhase::Live => FeedStatus::Ready,
            ReconcilerPhase::SnapshotFailed => FeedStatus::Error,
            // An unmounted feed is never rendered; report what it last showed.
            ReconcilerPhase::Unmounted if visible_events == 0 => FeedStatus::Empty,
            ReconcilerPhase::Unmounted => FeedStatus::Ready,
        }
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ReconcilerPhase],
        next: ReconcilerPhase,
        action: &str,
    ) -> Result<ReconcilerPhase, InvalidTransition> {
        if !expected.contains(&self.phase) {
            return Err(InvalidTransition::new(self.phase, action));
        }
        self.phase = next;
        Ok(next)
    }
}
