use async_trait::async_trait;
use ethers::providers::{Middleware, Provider as EthersProvider, Ws};
use ethers::types::{Filter, H256};
use futures::StreamExt;
use provider::{ChainSource, ProviderError, Subscription};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{BlockRange, EventFilter, RawEvent};

/// Live events buffered between the socket and the feed.
const SUBSCRIPTION_BUFFER: usize = 1024;

pub struct WsProvider {
    root: Arc<EthersProvider<Ws>>,
}

impl WsProvider {
    pub async fn connect(api_url: String) -> Result<Self, ProviderError> {
        let ws = Ws::connect(api_url.clone())
            .await
            .map_err(|e| ProviderError::Connection {
                url: api_url.clone(),
                reason: e.to_string(),
            })?;
        info!("Connected to provider at {}", api_url);
        Ok(Self {
            root: Arc::new(EthersProvider::new(ws)),
        })
    }
}

fn to_filter(filter: &EventFilter) -> Filter {
    let mut query = Filter::new()
        .address(filter.address)
        .topic0(filter.signature);
    if let Some(sender) = filter.sender {
        query = query.topic1(H256::from(sender));
    }
    if let Some(recipient) = filter.recipient {
        query = query.topic2(H256::from(recipient));
    }
    query
}

fn rpc_error(e: impl ToString) -> ProviderError {
    ProviderError::Rpc(e.to_string())
}

#[async_trait]
impl ChainSource for WsProvider {
    async fn latest_block_number(&self) -> Result<u64, ProviderError> {
        let number = self.root.get_block_number().await.map_err(rpc_error)?;
        Ok(number.as_u64())
    }

    async fn query_events(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<RawEvent>, ProviderError> {
        let query = to_filter(filter).from_block(range.from).to_block(range.to);
        let logs = self.root.get_logs(&query).await.map_err(rpc_error)?;
        debug!(
            from = range.from,
            to = range.to,
            logs = logs.len(),
            "Fetched historical logs"
        );
        Ok(logs.into_iter().map(RawEvent::from).collect())
    }

    async fn subscribe(&self, filter: &EventFilter) -> Result<Subscription, ProviderError> {
        let root = Arc::clone(&self.root);
        let query = to_filter(filter);
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        // The ethers stream borrows the provider, so it lives inside the task
        // that owns a clone of it.
        let task = tokio::spawn(async move {
            let mut stream = match root.subscribe_logs(&query).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(rpc_error(e)));
                    return;
                }
            };
            info!(id = ?stream.id, "Subscribed to transfer logs");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    log = stream.next() => match log {
                        Some(log) => {
                            if events_tx.send(RawEvent::from(log)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!("Transfer log stream ended");
                            break;
                        }
                    },
                }
            }

            match stream.unsubscribe().await {
                Ok(_) => info!("Unsubscribed from transfer logs"),
                Err(e) => warn!("Failed to unsubscribe from transfer logs: {}", e),
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Subscription::new(events_rx, cancel, task)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::SubscriptionClosed),
        }
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ProviderError> {
        let block = self
            .root
            .get_block(block_number)
            .await
            .map_err(rpc_error)?
            .ok_or(ProviderError::BlockNotFound(block_number))?;
        Ok(block.timestamp.as_u64() as i64)
    }
}
