//! Scripted loaders and transport used by the connector and reconciler tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use url::Url;

use crate::{
    connector::{ByteStream, StreamTransport},
    error::{SnapshotError, TransportError},
    reconciler::SnapshotLoad,
    types::Event,
};

pub fn stream_url() -> Url {
    Url::parse("http://feed.test/api/v1/activity/task-comments/stream").expect("static url")
}

pub fn event(id: &str) -> Event {
    Event::new(id, "2026-02-07T00:00:00Z").with_field("message", format!("message {id}"))
}

pub fn frame(event: &Event) -> Bytes {
    let json = serde_json::to_string(event).expect("event encodes");
    Bytes::from(format!("data: {json}\n\n"))
}

/// Sending half of an open scripted connection.
pub type StreamFeed = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

enum Script {
    Fail(TransportError),
    Open(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
}

#[derive(Default)]
struct TransportLog {
    scripts: VecDeque<Script>,
    connects: Vec<Instant>,
    last_event_ids: Vec<Option<String>>,
}

/// Transport that replays queued outcomes; once the queue is empty every
/// connect succeeds and stays open without sending anything.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_failure(&self, error: TransportError) {
        self.lock().scripts.push_back(Script::Fail(error));
    }

    /// Queue a connection that opens and returns the sender driving its body.
    pub fn push_open(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().scripts.push_back(Script::Open(rx));
        tx
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects.len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.lock().connects.clone()
    }

    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.lock().last_event_ids.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportLog> {
        self.log.lock().expect("transport log lock")
    }
}

impl StreamTransport for ScriptedTransport {
    async fn connect(
        &self,
        _url: &Url,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, TransportError> {
        let script = {
            let mut log = self.lock();
            log.connects.push(Instant::now());
            log.last_event_ids.push(last_event_id.map(ToOwned::to_owned));
            log.scripts.pop_front()
        };

        match script {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Open(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(stream::pending::<Result<Bytes, TransportError>>().boxed()),
        }
    }
}

/// Loader whose single result is released by the test.
pub struct GatedLoader {
    rx: Mutex<Option<oneshot::Receiver<Result<Vec<Event>, SnapshotError>>>>,
}

impl GatedLoader {
    pub fn new() -> (Self, oneshot::Sender<Result<Vec<Event>, SnapshotError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    pub fn ready(result: Result<Vec<Event>, SnapshotError>) -> Self {
        let (loader, tx) = Self::new();
        let _ = tx.send(result);
        loader
    }
}

impl SnapshotLoad for GatedLoader {
    async fn load(&self) -> Result<Vec<Event>, SnapshotError> {
        let rx = self.rx.lock().expect("loader lock").take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(SnapshotError::Network("gate dropped".into()))),
            None => Err(SnapshotError::Network("loader already used".into())),
        }
    }
}

/// Loader that answers successive loads from a fixed list, in order.
pub struct SequenceLoader {
    results: Mutex<VecDeque<Result<Vec<Event>, SnapshotError>>>,
}

impl SequenceLoader {
    pub fn new(results: impl IntoIterator<Item = Result<Vec<Event>, SnapshotError>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
        }
    }
}

impl SnapshotLoad for SequenceLoader {
    async fn load(&self) -> Result<Vec<Event>, SnapshotError> {
        self.results
            .lock()
            .expect("loader lock")
            .pop_front()
            .unwrap_or_else(|| Err(SnapshotError::Network("no more snapshots".into())))
    }
}
