//! Read-only projection of the reconciler state for the presentation layer.

use tokio::sync::watch;

use crate::{
    error::StoreClosed,
    types::{Event, FeedStatus, StreamStatus},
};

/// Everything a view needs to render the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub status: FeedStatus,
    /// Visible events, newest first. Always empty while `status` is `Error`.
    pub events: Vec<Event>,
    /// Last error reason; set only while `status` is `Error`.
    pub error: Option<String>,
    pub stream: StreamStatus,
}

impl Default for FeedView {
    fn default() -> Self {
        Self {
            status: FeedStatus::Loading,
            events: Vec::new(),
            error: None,
            stream: StreamStatus::default(),
        }
    }
}

impl FeedView {
    pub fn event_ids(&self) -> Vec<&str> {
        self.events.iter().map(|event| event.id.as_str()).collect()
    }
}

/// Reactive handle on the latest [`FeedView`].
///
/// Cheap to clone; every clone observes the same feed.
#[derive(Debug, Clone)]
pub struct FeedStore {
    rx: watch::Receiver<FeedView>,
}

impl FeedStore {
    pub(crate) fn new(rx: watch::Receiver<FeedView>) -> Self {
        Self { rx }
    }

    /// Clone of the current view.
    pub fn view(&self) -> FeedView {
        self.rx.borrow().clone()
    }

    pub fn status(&self) -> FeedStatus {
        self.rx.borrow().status
    }

    /// Wait until the reconciler publishes a view this handle has not seen.
    pub async fn changed(&mut self) -> Result<FeedView, StoreClosed> {
        self.rx.changed().await.map_err(|_| StoreClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until the view satisfies `predicate` (checked against the current view first).
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<FeedView, StoreClosed>
    where
        F: FnMut(&FeedView) -> bool,
    {
        let view = self
            .rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| StoreClosed)?;
        Ok(view.clone())
    }
}
