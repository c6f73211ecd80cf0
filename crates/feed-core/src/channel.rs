use tokio::sync::{mpsc, watch};

use crate::{
    error::FeedChannelError,
    store::{FeedStore, FeedView},
    types::FeedCommand,
};

/// Command/view channel pair shared by a feed task and its handle.
#[derive(Clone, Debug)]
pub struct FeedChannels {
    command_tx: mpsc::Sender<FeedCommand>,
    view_tx: watch::Sender<FeedView>,
}

impl FeedChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(command_buffer: usize) -> (Self, mpsc::Receiver<FeedCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (view_tx, _) = watch::channel(FeedView::default());

        (
            Self {
                command_tx,
                view_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to published feed views.
    pub fn subscribe(&self) -> FeedStore {
        FeedStore::new(self.view_tx.subscribe())
    }

    /// Send one command to the feed task.
    pub async fn send_command(&self, command: FeedCommand) -> Result<(), FeedChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| FeedChannelError::Unmounted)
    }

    /// Replace the published view.
    ///
    /// Publishing works with zero subscribers; late subscribers see the latest view.
    pub fn publish(&self, view: FeedView) {
        self.view_tx.send_replace(view);
    }
}
