use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use provider::{ChainSource, ProviderError, Subscription};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use types::{BlockRange, EventFilter, RawEvent};

/// Scriptable in-memory chain.
///
/// History, block timestamps and failures are configured up front; live
/// events are pushed with [`MockProvider::emit`].
#[derive(Default)]
pub struct MockProvider {
    latest_block: AtomicU64,
    history: Mutex<Vec<RawEvent>>,
    timestamps: Mutex<HashMap<u64, i64>>,
    timestamp_failures: Mutex<HashMap<u64, u32>>,
    timestamp_lookups: AtomicUsize,
    query_failures: AtomicU32,
    subscribe_failures: AtomicU32,

    history_gated: AtomicBool,
    history_gate: Notify,

    subscribe_attempts: AtomicUsize,
    /// Subscribe attempts seen at each latest block read
    latest_reads: Mutex<Vec<usize>>,
    subscribers: Mutex<Vec<(EventFilter, mpsc::Sender<RawEvent>)>>,
    active_subscriptions: Arc<AtomicUsize>,
    subscribed: Notify,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest_block(&self, block_number: u64) {
        self.latest_block.store(block_number, Ordering::SeqCst);
    }

    pub fn add_history(&self, event: RawEvent) {
        if let Some(block) = event.block_number {
            self.latest_block.fetch_max(block, Ordering::SeqCst);
        }
        self.history.lock().unwrap().push(event);
    }

    pub fn set_block_timestamp(&self, block_number: u64, timestamp: i64) {
        self.timestamps.lock().unwrap().insert(block_number, timestamp);
    }

    /// The next `times` timestamp lookups of `block_number` fail.
    pub fn fail_timestamp(&self, block_number: u64, times: u32) {
        self.timestamp_failures
            .lock()
            .unwrap()
            .insert(block_number, times);
    }

    pub fn fail_queries(&self, times: u32) {
        self.query_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_subscriptions(&self, times: u32) {
        self.subscribe_failures.store(times, Ordering::SeqCst);
    }

    /// Holds every history query until [`MockProvider::release_history`].
    pub fn hold_history(&self) {
        self.history_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_history(&self) {
        self.history_gated.store(false, Ordering::SeqCst);
        self.history_gate.notify_one();
    }

    /// Delivers `event` to every live subscription whose filter matches it.
    /// Returns the number of subscriptions reached.
    pub fn emit(&self, event: RawEvent) -> usize {
        let subscribers = self.subscribers.lock().unwrap();
        subscribers
            .iter()
            .filter(|(filter, _)| matches(filter, &event))
            .filter(|(_, tx)| tx.try_send(event.clone()).is_ok())
            .count()
    }

    /// Simulates the node dropping every live subscription.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub async fn wait_for_subscription(&self) {
        self.subscribed.notified().await;
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    /// For every `latest_block_number` call, how many subscribe attempts
    /// had been made before it.
    pub fn latest_block_reads(&self) -> Vec<usize> {
        self.latest_reads.lock().unwrap().clone()
    }

    pub fn timestamp_lookups(&self) -> usize {
        self.timestamp_lookups.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn topic_address(event: &RawEvent, index: usize) -> Option<Address> {
    event
        .topics
        .get(index)
        .map(|topic| Address::from_slice(&topic.as_bytes()[12..]))
}

fn matches(filter: &EventFilter, event: &RawEvent) -> bool {
    event.address == filter.address
        && event.topics.first() == Some(&filter.signature)
        && filter
            .sender
            .map_or(true, |sender| topic_address(event, 1) == Some(sender))
        && filter
            .recipient
            .map_or(true, |recipient| topic_address(event, 2) == Some(recipient))
}

/// Builds a transfer log the way a node would deliver it.
#[allow(clippy::too_many_arguments)]
pub fn transfer_event(
    address: Address,
    signature: H256,
    from: Address,
    to: Address,
    value: U256,
    block_number: u64,
    log_index: u64,
    transaction_hash: H256,
) -> RawEvent {
    let mut data = [0u8; 32];
    value.to_big_endian(&mut data);
    RawEvent {
        address,
        topics: vec![signature, H256::from(from), H256::from(to)],
        data: Bytes::from(data.to_vec()),
        transaction_hash: Some(transaction_hash),
        block_number: Some(block_number),
        log_index: Some(log_index),
        removed: false,
    }
}

#[async_trait]
impl ChainSource for MockProvider {
    async fn latest_block_number(&self) -> Result<u64, ProviderError> {
        self.latest_reads
            .lock()
            .unwrap()
            .push(self.subscribe_attempts.load(Ordering::SeqCst));
        Ok(self.latest_block.load(Ordering::SeqCst))
    }

    async fn query_events(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<RawEvent>, ProviderError> {
        if self.history_gated.load(Ordering::SeqCst) {
            self.history_gate.notified().await;
        }
        if take_failure(&self.query_failures) {
            return Err(ProviderError::Rpc("query failed".to_string()));
        }
        let history = self.history.lock().unwrap();
        Ok(history
            .iter()
            .filter(|event| event.block_number.map_or(false, |b| range.contains(b)))
            .filter(|event| matches(filter, event))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, filter: &EventFilter) -> Result<Subscription, ProviderError> {
        self.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.subscribe_failures) {
            return Err(ProviderError::SubscriptionClosed);
        }
        let (tx, rx) = mpsc::channel(1024);
        self.subscribers.lock().unwrap().push((filter.clone(), tx));

        let active = Arc::clone(&self.active_subscriptions);
        active.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            active.fetch_sub(1, Ordering::SeqCst);
        });

        self.subscribed.notify_one();
        Ok(Subscription::new(rx, cancel, task))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ProviderError> {
        self.timestamp_lookups.fetch_add(1, Ordering::SeqCst);
        // answer on a later poll, like a real round trip
        tokio::task::yield_now().await;
        {
            let mut failures = self.timestamp_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&block_number) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProviderError::Rpc(format!(
                        "timestamp of block {} unavailable",
                        block_number
                    )));
                }
            }
        }
        self.timestamps
            .lock()
            .unwrap()
            .get(&block_number)
            .copied()
            .ok_or(ProviderError::BlockNotFound(block_number))
    }
}
