use crate::age::Clock;
use crate::backfill::Backfiller;
use crate::error::FeedError;
use crate::live::LiveFeed;
use crate::reconciler::Reconciler;
use crate::resolver::TimestampResolver;
use crate::view::{project, SortKey, TransferRow, ViewState};
use config::Config;
use contracts::TokenContract;
use provider::ChainSource;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use types::Transfer;

const INBOX_CAPACITY: usize = 4096;

/// Everything that mutates feed state goes through the worker as one of these.
#[derive(Debug)]
pub enum FeedMessage {
    HistoricalLoaded(Vec<Transfer>),
    HistoricalFailed(String),
    /// Decoded transfer waiting for its block timestamp
    Pending(String),
    Live(Transfer),
    /// Historical transfer whose timestamp was resolved after the batch
    Backfilled(Transfer),
    Tick(i64),
    Connectivity(Connectivity),
    SetSenderFilter(String),
    SetRecipientFilter(String),
    TriggerSort(SortKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Connectivity {
    Connecting,
    Live,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum HistoryState {
    Loading,
    Loaded { transfers: usize },
    Failed { reason: String },
}

/// Immutable picture of the feed handed to readers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Shared clock sample every age in `rows` was computed from
    pub now: i64,
    pub rows: Vec<TransferRow>,
    /// Transfers in the collection before filtering
    pub total: usize,
    pub pending: usize,
    pub connectivity: Connectivity,
    pub history: HistoryState,
    pub view: ViewState,
    /// True while live updates are not flowing
    pub stale: bool,
}

/// Single writer of the transfer collection, the view state and the clock.
struct FeedWorker {
    reconciler: Reconciler,
    view: ViewState,
    now: i64,
    connectivity: Connectivity,
    history: HistoryState,
    snapshot: watch::Sender<Arc<FeedSnapshot>>,
}

impl FeedWorker {
    fn new(now: i64) -> (Self, watch::Receiver<Arc<FeedSnapshot>>) {
        let (snapshot, rx) = watch::channel(Arc::new(empty_snapshot(now)));
        let worker = FeedWorker {
            reconciler: Reconciler::new(),
            view: ViewState::default(),
            now,
            connectivity: Connectivity::Connecting,
            history: HistoryState::Loading,
            snapshot,
        };
        (worker, rx)
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<FeedMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => {
                        if self.apply(message) {
                            self.publish();
                        }
                    }
                    None => break,
                },
            }
        }
        info!(transfers = self.reconciler.len(), "Feed worker stopped");
    }

    /// Applies one message. Returns whether the published view changed.
    fn apply(&mut self, message: FeedMessage) -> bool {
        match message {
            FeedMessage::HistoricalLoaded(batch) => {
                let received = batch.len();
                let added = self.reconciler.merge_historical(batch);
                info!(received, added, "Merged historical transfers");
                self.history = HistoryState::Loaded { transfers: received };
                true
            }
            FeedMessage::HistoricalFailed(reason) => {
                self.history = HistoryState::Failed { reason };
                true
            }
            FeedMessage::Pending(hash) => self.reconciler.mark_pending(&hash),
            FeedMessage::Live(transfer) => {
                let hash = transfer.transaction_hash.clone();
                let inserted = self.reconciler.insert(transfer);
                if !inserted {
                    info!(tx = %hash, "Ignoring redelivered transfer");
                }
                // a duplicate may still have cleared a pending entry
                true
            }
            FeedMessage::Backfilled(transfer) => {
                self.reconciler.insert(transfer);
                true
            }
            FeedMessage::Tick(now) => {
                self.now = now;
                true
            }
            FeedMessage::Connectivity(connectivity) => {
                if self.connectivity == connectivity {
                    return false;
                }
                match &connectivity {
                    Connectivity::Degraded { reason } => warn!(reason, "Live feed degraded"),
                    _ => info!(state = ?connectivity, "Live feed connectivity changed"),
                }
                self.connectivity = connectivity;
                true
            }
            FeedMessage::SetSenderFilter(value) => match self.view.set_sender_filter(&value) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Ignoring sender filter: {}", e);
                    false
                }
            },
            FeedMessage::SetRecipientFilter(value) => {
                match self.view.set_recipient_filter(&value) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Ignoring recipient filter: {}", e);
                        false
                    }
                }
            }
            FeedMessage::TriggerSort(key) => {
                self.view.trigger_sort(key);
                true
            }
        }
    }

    fn build_snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            now: self.now,
            rows: project(self.reconciler.transfers(), &self.view, self.now),
            total: self.reconciler.len(),
            pending: self.reconciler.pending(),
            connectivity: self.connectivity.clone(),
            history: self.history.clone(),
            view: self.view.clone(),
            stale: self.connectivity != Connectivity::Live,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(Arc::new(self.build_snapshot()));
    }
}

fn empty_snapshot(now: i64) -> FeedSnapshot {
    FeedSnapshot {
        now,
        rows: vec![],
        total: 0,
        pending: 0,
        connectivity: Connectivity::Connecting,
        history: HistoryState::Loading,
        view: ViewState::default(),
        stale: true,
    }
}

/// Handle to a running feed session.
///
/// Cloning is cheap; every clone talks to the same worker.
#[derive(Clone)]
pub struct FeedHandle {
    inbox: mpsc::Sender<FeedMessage>,
    snapshot: watch::Receiver<Arc<FeedSnapshot>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl FeedHandle {
    /// Starts the worker, the clock ticker, the historical backfill and the
    /// live subscription. The backfill reads the latest block only after the
    /// first subscription attempt, so no block falls between the two.
    pub fn start(
        config: &Config,
        source: Arc<dyn ChainSource>,
        contract: Arc<dyn TokenContract>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FeedError> {
        let sender = config.query_sender.as_deref();
        let recipient = config.query_recipient.as_deref();
        let filter = contract.transfer_filter(sender, recipient)?;

        let (inbox, messages) = mpsc::channel(INBOX_CAPACITY);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let resolver = Arc::new(TimestampResolver::new(
            Arc::clone(&source),
            config.retry.clone(),
        ));

        let (worker, snapshot) = FeedWorker::new(clock.now());
        tracker.spawn(worker.run(messages, cancel.clone()));

        tracker.spawn(run_ticker(
            clock,
            config.tick_interval,
            inbox.clone(),
            cancel.clone(),
        ));

        let (first_attempt, subscribed) = oneshot::channel();
        let live = LiveFeed {
            source: Arc::clone(&source),
            contract: Arc::clone(&contract),
            resolver: Arc::clone(&resolver),
            filter,
            resubscribe_delay: config.resubscribe_delay,
            inbox: inbox.clone(),
            cancel: cancel.clone(),
            tracker: tracker.clone(),
            first_attempt: Some(first_attempt),
        };
        tracker.spawn(live.run());

        let backfiller = Backfiller::new(
            source,
            contract,
            Arc::clone(&resolver),
            config.retry.clone(),
            config.history_blocks,
        );
        tracker.spawn(run_backfill(
            backfiller,
            subscribed,
            resolver,
            config.query_sender.clone(),
            config.query_recipient.clone(),
            inbox.clone(),
            cancel.clone(),
            tracker.clone(),
        ));

        info!("Feed session started");
        Ok(FeedHandle {
            inbox,
            snapshot,
            cancel,
            tracker,
        })
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.snapshot.clone()
    }

    pub async fn set_sender_filter(&self, value: impl Into<String>) -> Result<(), FeedError> {
        self.send(FeedMessage::SetSenderFilter(value.into())).await
    }

    pub async fn set_recipient_filter(&self, value: impl Into<String>) -> Result<(), FeedError> {
        self.send(FeedMessage::SetRecipientFilter(value.into())).await
    }

    pub async fn trigger_sort(&self, key: SortKey) -> Result<(), FeedError> {
        self.send(FeedMessage::TriggerSort(key)).await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels every task of the session, unsubscribes from live events and
    /// waits until all of them have finished.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Feed session stopped");
    }

    async fn send(&self, message: FeedMessage) -> Result<(), FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::SessionClosed);
        }
        self.inbox
            .send(message)
            .await
            .map_err(|_| FeedError::SessionClosed)
    }
}

async fn run_ticker(
    clock: Arc<dyn Clock>,
    period: Duration,
    inbox: mpsc::Sender<FeedMessage>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if inbox.send(FeedMessage::Tick(clock.now())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Hands `message` to the worker. Once the worker is gone there is nobody
/// left to tell, so the message is dropped.
pub(crate) async fn forward(inbox: &mpsc::Sender<FeedMessage>, message: FeedMessage) {
    if let Err(e) = inbox.send(message).await {
        debug!("Feed worker stopped, dropping {:?}", e.0);
    }
}

async fn run_backfill(
    backfiller: Backfiller,
    subscribed: oneshot::Receiver<()>,
    resolver: Arc<TimestampResolver>,
    sender: Option<String>,
    recipient: Option<String>,
    inbox: mpsc::Sender<FeedMessage>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        // a dropped sender means the live feed ended, history still loads
        _ = subscribed => {}
    }

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = backfiller.load_historical(sender.as_deref(), recipient.as_deref()) => result,
    };

    match result {
        Ok(backfill) => {
            for pending in &backfill.unresolved {
                forward(&inbox, FeedMessage::Pending(pending.transaction_hash.clone())).await;
            }
            forward(&inbox, FeedMessage::HistoricalLoaded(backfill.transfers)).await;

            for pending in backfill.unresolved {
                let resolver = Arc::clone(&resolver);
                let inbox = inbox.clone();
                let cancel = cancel.clone();
                tracker.spawn(async move {
                    if let Some(timestamp) =
                        resolver.resolve_until(pending.block_number, &cancel).await
                    {
                        forward(&inbox, FeedMessage::Backfilled(pending.resolve(timestamp)))
                            .await;
                    }
                });
            }
        }
        Err(e) => {
            error!("Historical backfill failed: {}", e);
            forward(&inbox, FeedMessage::HistoricalFailed(e.to_string())).await;
        }
    }
}
