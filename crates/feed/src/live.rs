use crate::error::FeedError;
use crate::resolver::{decode_event, TimestampResolver};
use crate::session::{forward, Connectivity, FeedMessage};
use contracts::TokenContract;
use provider::{ChainSource, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use types::{EventFilter, RawEvent};

/// Keeps a live subscription open and feeds decoded transfers to the worker.
pub struct LiveFeed {
    pub(crate) source: Arc<dyn ChainSource>,
    pub(crate) contract: Arc<dyn TokenContract>,
    pub(crate) resolver: Arc<TimestampResolver>,
    pub(crate) filter: EventFilter,
    pub(crate) resubscribe_delay: Duration,
    pub(crate) inbox: mpsc::Sender<FeedMessage>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: TaskTracker,
    /// Fired after the first subscription attempt, successful or not
    pub(crate) first_attempt: Option<oneshot::Sender<()>>,
}

impl LiveFeed {
    pub async fn run(mut self) {
        info!("Syncing new transfers");
        loop {
            let subscribed = self.source.subscribe(&self.filter).await;
            if let Some(first_attempt) = self.first_attempt.take() {
                if first_attempt.send(()).is_err() {
                    debug!("Backfill no longer waits for the subscription");
                }
            }
            match subscribed {
                Ok(subscription) => {
                    self.report(Connectivity::Live).await;
                    if !self.drain(subscription).await {
                        return;
                    }
                    self.report(Connectivity::Degraded {
                        reason: "live subscription closed".to_string(),
                    })
                    .await;
                }
                Err(e) => {
                    warn!("Failed to subscribe to transfers: {}", e);
                    self.report(Connectivity::Degraded {
                        reason: e.to_string(),
                    })
                    .await;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.resubscribe_delay) => {
                    info!("Re-establishing live subscription");
                }
            }
        }
    }

    /// Forwards events until the node closes the subscription (returns true)
    /// or the session is cancelled (returns false).
    async fn drain(&self, mut subscription: Subscription) -> bool {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    subscription.unsubscribe().await;
                    return false;
                }
                event = subscription.next() => match event {
                    Some(event) => {
                        if let Err(e) = self.on_live_event(event).await {
                            debug!("Dropping live event: {}", e);
                        }
                    }
                    None => {
                        warn!("Live subscription closed");
                        subscription.unsubscribe().await;
                        return true;
                    }
                },
            }
        }
    }

    /// Decodes a delivered event and hands its timestamp resolution to a
    /// tracked task. The resolved transfer reaches the worker as
    /// [`FeedMessage::Live`], where duplicates are ignored.
    pub async fn on_live_event(&self, event: RawEvent) -> Result<(), FeedError> {
        let pending = decode_event(&event, self.contract.as_ref())?;
        debug!(
            tx = %pending.transaction_hash,
            block = pending.block_number,
            "Received live transfer"
        );
        self.inbox
            .send(FeedMessage::Pending(pending.transaction_hash.clone()))
            .await
            .map_err(|_| FeedError::SessionClosed)?;

        let resolver = Arc::clone(&self.resolver);
        let inbox = self.inbox.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            if let Some(timestamp) = resolver.resolve_until(pending.block_number, &cancel).await {
                forward(&inbox, FeedMessage::Live(pending.resolve(timestamp))).await;
            }
        });
        Ok(())
    }

    async fn report(&self, connectivity: Connectivity) {
        forward(&self.inbox, FeedMessage::Connectivity(connectivity)).await;
    }
}
