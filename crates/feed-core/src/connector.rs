//! Single live push connection with backoff-aware close reporting.
//!
//! The connector never reconnects on its own. Each connection attempt runs in
//! its own task and reports back through a channel owned by the caller; the
//! caller hands every received [`StreamSignal`] to [`StreamConnector::observe`],
//! which filters out signals from superseded attempts and turns the rest into
//! [`ConnectorEvent`]s.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use rand::{SeedableRng, rngs::StdRng};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace, warn};
use url::Url;

use crate::{
    error::TransportError,
    retry::RetryPolicy,
    types::{ConnectionPhase, ConnectionState, Event},
    wire::{SseDecoder, SseFrame, decode_event},
};

/// Raw body chunks of an open event stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Opens event-stream connections.
pub trait StreamTransport: Send + Sync + 'static {
    /// Connect to `url`, resuming after `last_event_id` when the server supports it.
    fn connect(
        &self,
        url: &Url,
        last_event_id: Option<&str>,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;
}

/// Connector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub retry: RetryPolicy,
    /// A connection open at least this long resets the attempt counter when it closes.
    pub stable_after: Duration,
    /// Fixed jitter seed; `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stable_after: Duration::from_secs(10),
            rng_seed: None,
        }
    }
}

/// Observable connection transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Opened,
    Event(Event),
    /// The connection is gone. The caller decides whether to `start` again
    /// after `retry_after`.
    Closed {
        reason: TransportError,
        retry_after: Duration,
        /// Attempt index the delay was computed for.
        attempt: u32,
    },
}

/// Message from a connection task to the connector's owner.
#[derive(Debug)]
pub struct StreamSignal {
    generation: u64,
    kind: SignalKind,
}

#[derive(Debug)]
enum SignalKind {
    Opened,
    Event(Event),
    Closed {
        reason: TransportError,
        opened_for: Option<Duration>,
        last_event_id: Option<String>,
        retry_hint: Option<Duration>,
    },
}

#[derive(Debug)]
struct ActiveConnection {
    generation: u64,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

pub struct StreamConnector<T: StreamTransport> {
    transport: Arc<T>,
    signal_tx: mpsc::Sender<StreamSignal>,
    config: ConnectorConfig,
    rng: StdRng,
    state: ConnectionState,
    generation: u64,
    active: Option<ActiveConnection>,
    last_event_id: Option<String>,
    /// Latest `retry:` value the server sent; it outlives the connection that carried it.
    retry_hint: Option<Duration>,
}

impl<T: StreamTransport> StreamConnector<T> {
    pub fn new(
        transport: Arc<T>,
        signal_tx: mpsc::Sender<StreamSignal>,
        config: ConnectorConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            transport,
            signal_tx,
            config,
            rng,
            state: ConnectionState::default(),
            generation: 0,
            active: None,
            last_event_id: None,
            retry_hint: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a connection attempt or open connection is outstanding.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin connecting to `url`, superseding any previous attempt.
    pub fn start(&mut self, url: Url) {
        self.stop();

        self.generation += 1;
        let generation = self.generation;
        self.state.phase = ConnectionPhase::Connecting;
        debug!(generation, attempt = self.state.attempt, %url, "stream connecting");

        let stop = CancellationToken::new();
        let connection = Connection {
            transport: Arc::clone(&self.transport),
            url,
            generation,
            signal_tx: self.signal_tx.clone(),
            last_event_id: self.last_event_id.clone(),
        };
        let task = tokio::spawn(connection.run(stop.clone()).in_current_span());

        self.active = Some(ActiveConnection {
            generation,
            stop,
            task,
        });
    }

    /// Cancel any outstanding attempt or open connection. Idempotent.
    ///
    /// Signals already queued from the cancelled connection are discarded by
    /// [`observe`](Self::observe), so nothing is delivered after this returns.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.stop.cancel();
        active.task.abort();
        self.state.phase = ConnectionPhase::Closed;
        debug!(generation = active.generation, "stream stopped");
    }

    /// Stop and forget resume position and backoff progress.
    pub fn reset(&mut self) {
        self.stop();
        self.state = ConnectionState::default();
        self.last_event_id = None;
        self.retry_hint = None;
    }

    /// Translate a signal from a connection task; stale signals yield `None`.
    pub fn observe(&mut self, signal: StreamSignal) -> Option<ConnectorEvent> {
        let current = self.active.as_ref().map(|active| active.generation);
        if current != Some(signal.generation) {
            trace!(
                generation = signal.generation,
                ?current,
                "dropping signal from superseded connection"
            );
            return None;
        }

        match signal.kind {
            SignalKind::Opened => {
                self.state.phase = ConnectionPhase::Open;
                Some(ConnectorEvent::Opened)
            }
            SignalKind::Event(event) => Some(ConnectorEvent::Event(event)),
            SignalKind::Closed {
                reason,
                opened_for,
                last_event_id,
                retry_hint,
            } => {
                self.active = None;
                self.state.phase = ConnectionPhase::Closed;
                if last_event_id.is_some() {
                    self.last_event_id = last_event_id;
                }
                if retry_hint.is_some() {
                    self.retry_hint = retry_hint;
                }
                if opened_for.is_some_and(|open| open >= self.config.stable_after) {
                    self.state.attempt = 0;
                }

                let attempt = self.state.attempt;
                let retry_after =
                    self.config
                        .retry
                        .jittered_delay_for_attempt(attempt, self.retry_hint, &mut self.rng);
                self.state.attempt = attempt.saturating_add(1);

                debug!(
                    generation = signal.generation,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    error = %reason,
                    "stream closed"
                );
                Some(ConnectorEvent::Closed {
                    reason,
                    retry_after,
                    attempt,
                })
            }
        }
    }
}

impl<T: StreamTransport> Drop for StreamConnector<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-attempt bookkeeping reported back when the connection closes.
#[derive(Debug, Default)]
struct Progress {
    opened_at: Option<Instant>,
    last_event_id: Option<String>,
    retry_hint: Option<Duration>,
}

struct Connection<T> {
    transport: Arc<T>,
    url: Url,
    generation: u64,
    signal_tx: mpsc::Sender<StreamSignal>,
    last_event_id: Option<String>,
}

impl<T: StreamTransport> Connection<T> {
    async fn run(self, stop: CancellationToken) {
        let mut progress = Progress {
            last_event_id: self.last_event_id.clone(),
            ..Progress::default()
        };

        let reason = tokio::select! {
            _ = stop.cancelled() => return,
            reason = self.pump(&mut progress) => reason,
        };

        let closed = SignalKind::Closed {
            reason,
            opened_for: progress.opened_at.map(|opened_at| opened_at.elapsed()),
            last_event_id: progress.last_event_id,
            retry_hint: progress.retry_hint,
        };
        let _ = self.send(closed).await;
    }

    /// Drive the connection until it fails or ends; returns why it closed.
    async fn pump(&self, progress: &mut Progress) -> TransportError {
        let mut body = match self
            .transport
            .connect(&self.url, progress.last_event_id.as_deref())
            .await
        {
            Ok(body) => body,
            Err(err) => return err,
        };

        progress.opened_at = Some(Instant::now());
        if !self.send(SignalKind::Opened).await {
            return TransportError::Ended;
        }

        let mut decoder = SseDecoder::new();
        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(&chunk) {
                        let frame = match frame {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(
                                    generation = self.generation,
                                    error = %err,
                                    "dropping malformed stream line"
                                );
                                continue;
                            }
                        };
                        if !self.deliver(frame, progress).await {
                            return TransportError::Ended;
                        }
                    }
                }
                Some(Err(err)) => return err,
                None => {
                    if let Some(frame) = std::mem::take(&mut decoder).finish() {
                        self.deliver(frame, progress).await;
                    }
                    return TransportError::Ended;
                }
            }
        }
    }

    /// Forward one frame; returns `false` once the owner has gone away.
    async fn deliver(&self, frame: SseFrame, progress: &mut Progress) -> bool {
        if let Some(id) = &frame.id {
            progress.last_event_id = Some(id.clone());
        }
        if let Some(retry) = frame.retry {
            progress.retry_hint = Some(retry);
        }

        match decode_event(&frame) {
            Ok(Some(event)) => {
                trace!(generation = self.generation, event_id = %event.id, "stream event");
                self.send(SignalKind::Event(event)).await
            }
            Ok(None) => true,
            Err(err) => {
                warn!(
                    generation = self.generation,
                    error = %err,
                    "dropping malformed stream frame"
                );
                true
            }
        }
    }

    async fn send(&self, kind: SignalKind) -> bool {
        self.signal_tx
            .send(StreamSignal {
                generation: self.generation,
                kind,
            })
            .await
            .is_ok()
    }
}
