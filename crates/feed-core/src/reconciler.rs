//! The feed actor: merges one snapshot and the live stream into a single
//! deduplicated sequence and publishes it to the store.
//!
//! All feed mutation happens inside one task. The snapshot task and the
//! connection tasks hand their results over channels; unmount cancels the
//! actor, which then stops everything it started before exiting.

use std::{future::Future, sync::Arc};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    channel::FeedChannels,
    connector::{ConnectorConfig, ConnectorEvent, StreamConnector, StreamSignal, StreamTransport},
    error::{FeedChannelError, SnapshotError},
    feed::{DEFAULT_MAX_ITEMS, FeedState, MergeOutcome},
    state_machine::{ReconcilerStateMachine, StreamDisposition},
    store::{FeedStore, FeedView},
    types::{ConnectionPhase, Event, FeedCommand, FeedStatus, StreamStatus},
};

/// One-shot fetch of the current feed contents.
pub trait SnapshotLoad: Send + Sync + 'static {
    /// Perform exactly one request. Never retries.
    fn load(&self) -> impl Future<Output = Result<Vec<Event>, SnapshotError>> + Send;
}

/// Settings for one mounted feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Event-stream endpoint handed to the connector on every (re)connect.
    pub stream_url: Url,
    /// Retention cap for visible events.
    pub max_items: usize,
    pub connector: ConnectorConfig,
    pub command_buffer: usize,
    pub signal_buffer: usize,
}

impl FeedConfig {
    pub fn new(stream_url: Url) -> Self {
        Self {
            stream_url,
            max_items: DEFAULT_MAX_ITEMS,
            connector: ConnectorConfig::default(),
            command_buffer: 8,
            signal_buffer: 256,
        }
    }
}

/// Owner handle of a mounted feed. Dropping it unmounts the feed.
#[derive(Debug)]
pub struct FeedHandle {
    mount_id: Uuid,
    channels: FeedChannels,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn mount_id(&self) -> Uuid {
        self.mount_id
    }

    /// Reactive view of the feed.
    pub fn store(&self) -> FeedStore {
        self.channels.subscribe()
    }

    /// Explicit user retry: discard the session and load a fresh snapshot.
    pub async fn reload(&self) -> Result<(), FeedChannelError> {
        self.channels.send_command(FeedCommand::Reload).await
    }

    /// Stop the stream, cancel pending work, and wait for the feed task to exit.
    ///
    /// No store update is published after this returns.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            warn!(mount_id = %self.mount_id, "feed task panicked before unmount");
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start a feed: snapshot load and stream connection begin concurrently.
pub fn mount<L, T>(loader: L, transport: T, config: FeedConfig) -> FeedHandle
where
    L: SnapshotLoad,
    T: StreamTransport,
{
    let mount_id = Uuid::new_v4();
    let (channels, command_rx) = FeedChannels::new(config.command_buffer);
    let (signal_tx, signal_rx) = mpsc::channel(config.signal_buffer.max(1));
    let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let runtime = FeedRuntime {
        loader: Arc::new(loader),
        connector: StreamConnector::new(Arc::new(transport), signal_tx, config.connector),
        stream_url: config.stream_url,
        channels: channels.clone(),
        command_rx,
        signal_rx,
        snapshot_tx,
        snapshot_rx,
        cancel: cancel.clone(),
        machine: ReconcilerStateMachine::default(),
        feed: FeedState::new(config.max_items),
        buffered: Vec::new(),
        max_items: config.max_items.max(1),
        error: None,
        snapshot_task: None,
        session: 0,
        retry_at: None,
        stream: StreamStatus::default(),
    };

    let span = info_span!("feed", %mount_id);
    let task = tokio::spawn(runtime.run().instrument(span));

    FeedHandle {
        mount_id,
        channels,
        cancel,
        task: Some(task),
    }
}

#[derive(Debug)]
struct SnapshotDone {
    session: u64,
    result: Result<Vec<Event>, SnapshotError>,
}

struct FeedRuntime<L, T: StreamTransport> {
    loader: Arc<L>,
    connector: StreamConnector<T>,
    stream_url: Url,
    channels: FeedChannels,
    command_rx: mpsc::Receiver<FeedCommand>,
    signal_rx: mpsc::Receiver<StreamSignal>,
    snapshot_tx: mpsc::Sender<SnapshotDone>,
    snapshot_rx: mpsc::Receiver<SnapshotDone>,
    cancel: CancellationToken,
    machine: ReconcilerStateMachine,
    feed: FeedState,
    /// Stream events received before the snapshot resolved, in arrival order.
    buffered: Vec<Event>,
    max_items: usize,
    error: Option<String>,
    snapshot_task: Option<JoinHandle<()>>,
    session: u64,
    retry_at: Option<Instant>,
    stream: StreamStatus,
}

impl<L: SnapshotLoad, T: StreamTransport> FeedRuntime<L, T> {
    async fn run(mut self) {
        info!(stream_url = %self.stream_url, "feed mounted");
        self.begin_session();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(command) = self.command_rx.recv() => self.handle_command(command),
                Some(done) = self.snapshot_rx.recv() => self.handle_snapshot(done),
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
                _ = sleep_until_deadline(self.retry_at), if self.retry_at.is_some() => {
                    self.reconnect();
                }
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Reload => {
                info!("feed reload requested");
                self.begin_session();
            }
        }
    }

    /// Transition 1: request the snapshot and start the stream together.
    fn begin_session(&mut self) {
        if let Err(err) = self.machine.begin_session() {
            warn!(error = %err, "ignoring session start");
            return;
        }

        self.session += 1;
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        self.feed.clear();
        self.buffered.clear();
        self.error = None;
        self.retry_at = None;
        self.stream = StreamStatus::default();
        self.connector.reset();

        let loader = Arc::clone(&self.loader);
        let snapshot_tx = self.snapshot_tx.clone();
        let session = self.session;
        debug!(session, "requesting snapshot");
        self.snapshot_task = Some(tokio::spawn(
            async move {
                let result = loader.load().await;
                let _ = snapshot_tx.send(SnapshotDone { session, result }).await;
            }
            .in_current_span(),
        ));

        self.start_stream();
        self.publish();
    }

    /// Transitions 2 and 3.
    fn handle_snapshot(&mut self, done: SnapshotDone) {
        if done.session != self.session {
            trace!(session = done.session, "discarding snapshot from an earlier session");
            return;
        }
        self.snapshot_task = None;

        match done.result {
            Ok(items) => {
                if let Err(err) = self.machine.on_snapshot_loaded() {
                    warn!(error = %err, "ignoring snapshot result");
                    return;
                }
                let snapshot_len = items.len();
                self.feed.extend_snapshot(items);

                let mut merged = 0;
                for event in std::mem::take(&mut self.buffered) {
                    if self.feed.merge(event) == MergeOutcome::Inserted {
                        merged += 1;
                    }
                }
                debug!(
                    snapshot_len,
                    buffered_merged = merged,
                    visible = self.feed.len(),
                    "snapshot applied; feed is live"
                );
            }
            Err(err) => {
                if let Err(transition) = self.machine.on_snapshot_failed() {
                    warn!(error = %transition, "ignoring snapshot failure");
                    return;
                }
                warn!(reason = err.reason().as_str(), error = %err, "snapshot failed");

                // No feed to append to: tear the stream down for this session.
                self.buffered.clear();
                self.feed.clear();
                self.connector.stop();
                self.retry_at = None;
                self.stream.phase = ConnectionPhase::Closed;
                self.stream.retry_in_ms = None;
                self.error = Some(err.user_message());
            }
        }

        self.publish();
    }

    /// Transitions 4 and 5.
    fn handle_signal(&mut self, signal: StreamSignal) {
        let Some(event) = self.connector.observe(signal) else {
            return;
        };

        match event {
            ConnectorEvent::Opened => {
                debug!(attempt = self.connector.state().attempt, "stream open");
                self.stream.phase = ConnectionPhase::Open;
                self.stream.attempt = self.connector.state().attempt;
                self.stream.retry_in_ms = None;
                self.publish();
            }
            ConnectorEvent::Event(event) => self.handle_stream_event(event),
            ConnectorEvent::Closed {
                reason,
                retry_after,
                attempt,
            } => {
                self.stream.phase = ConnectionPhase::Closed;
                self.stream.attempt = self.connector.state().attempt;

                if !self.machine.wants_stream() {
                    debug!(error = %reason, "stream closed; not reconnecting");
                    self.stream.retry_in_ms = None;
                    self.publish();
                    return;
                }

                let retry_in_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    attempt,
                    retry_in_ms,
                    error = %reason,
                    "stream closed; reconnect scheduled"
                );
                self.retry_at = Some(Instant::now() + retry_after);
                self.stream.retry_in_ms = Some(retry_in_ms);
                self.stream.reconnects += 1;
                self.publish();
            }
        }
    }

    fn handle_stream_event(&mut self, event: Event) {
        match self.machine.stream_disposition() {
            StreamDisposition::Buffer => {
                trace!(event_id = %event.id, "buffering event until snapshot resolves");
                self.buffered.push(event);
                if self.buffered.len() > self.max_items {
                    let excess = self.buffered.len() - self.max_items;
                    self.buffered.drain(0..excess);
                }
            }
            StreamDisposition::Apply => {
                let event_id = event.id.clone();
                match self.feed.merge(event) {
                    MergeOutcome::Inserted => {
                        trace!(%event_id, "merged stream event");
                        self.publish();
                    }
                    MergeOutcome::Duplicate => {
                        trace!(%event_id, "discarding duplicate stream event");
                    }
                }
            }
            StreamDisposition::Drop => {
                trace!(event_id = %event.id, "dropping stream event outside a live session");
            }
        }
    }

    fn reconnect(&mut self) {
        self.retry_at = None;
        if !self.machine.wants_stream() {
            return;
        }
        self.start_stream();
        self.publish();
    }

    fn start_stream(&mut self) {
        self.connector.start(self.stream_url.clone());
        self.stream.phase = ConnectionPhase::Connecting;
        self.stream.attempt = self.connector.state().attempt;
        self.stream.retry_in_ms = None;
    }

    /// Transition 6.
    fn shutdown(&mut self) {
        self.machine.unmount();
        self.connector.stop();
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        self.buffered.clear();
        self.retry_at = None;
        info!("feed unmounted");
    }

    fn publish(&self) {
        let status = self.machine.status(self.feed.len());
        let failed = status == FeedStatus::Error;
        self.channels.publish(FeedView {
            status,
            events: if failed { Vec::new() } else { self.feed.to_vec() },
            error: if failed { self.error.clone() } else { None },
            stream: self.stream.clone(),
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
