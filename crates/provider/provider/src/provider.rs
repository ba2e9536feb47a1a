use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use types::{BlockRange, EventFilter, RawEvent};

mod error;
pub use error::ProviderError;

/// Source of raw transfer events and block timestamps.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, ProviderError>;

    async fn query_events(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<RawEvent>, ProviderError>;

    /// Opens a live subscription for events matching `filter`.
    async fn subscribe(&self, filter: &EventFilter) -> Result<Subscription, ProviderError>;

    /// Block production time in unix seconds.
    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ProviderError>;
}

/// Live event delivery backed by a forwarding task.
///
/// `next` yields `None` once the node side of the subscription is gone.
/// Dropping the subscription cancels the forwarding task; `unsubscribe`
/// additionally waits for it to finish its teardown.
pub struct Subscription {
    events: mpsc::Receiver<RawEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::Receiver<RawEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Subscription {
            events,
            cancel,
            task: Some(task),
        }
    }

    pub async fn next(&mut self) -> Option<RawEvent> {
        self.events.recv().await
    }

    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
