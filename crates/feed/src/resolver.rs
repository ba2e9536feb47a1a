use crate::error::FeedError;
use crate::retry::with_retry;
use config::RetryPolicy;
use contracts::{address_hex, TokenContract};
use provider::ChainSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use types::{PendingTransfer, RawEvent};

/// Turns a raw log into a transfer waiting for its timestamp.
pub fn decode_event(
    event: &RawEvent,
    contract: &dyn TokenContract,
) -> Result<PendingTransfer, FeedError> {
    if event.removed {
        return Err(FeedError::Removed);
    }
    let transaction_hash = event
        .transaction_hash_hex()
        .ok_or(FeedError::MissingTransactionHash)?;
    let block_number = event.block_number.ok_or(FeedError::MissingBlockNumber)?;
    let data = contract.decode_transfer(event)?;

    Ok(PendingTransfer {
        transaction_hash,
        sender: address_hex(&data.from),
        recipient: address_hex(&data.to),
        amount: contract.format_amount(data.value),
        block_number,
        log_index: event.log_index.unwrap_or_default(),
    })
}

/// Block timestamp lookups with retry and a per-block cache.
///
/// Concurrent lookups of one block share a single request.
pub struct TimestampResolver {
    source: Arc<dyn ChainSource>,
    retry: RetryPolicy,
    cache: Mutex<HashMap<u64, Arc<OnceCell<i64>>>>,
}

impl TimestampResolver {
    pub fn new(source: Arc<dyn ChainSource>, retry: RetryPolicy) -> Self {
        TimestampResolver {
            source,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bounded by the retry policy. A failed lookup leaves the block
    /// uncached so the next caller tries again.
    pub async fn resolve(&self, block_number: u64) -> Result<i64, FeedError> {
        let cell = {
            let mut cache = self.cache.lock().await;
            Arc::clone(cache.entry(block_number).or_default())
        };
        let source = &self.source;
        let retry = &self.retry;
        let timestamp = cell
            .get_or_try_init(|| {
                with_retry(retry, "block timestamp lookup", move || async move {
                    source
                        .block_timestamp(block_number)
                        .await
                        .map_err(FeedError::from)
                })
            })
            .await?;
        Ok(*timestamp)
    }

    /// Keeps resolving until it succeeds. Returns `None` once `cancel` fires.
    pub async fn resolve_until(
        &self,
        block_number: u64,
        cancel: &CancellationToken,
    ) -> Option<i64> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.resolve(block_number) => match result {
                    Ok(timestamp) => return Some(timestamp),
                    Err(e) => warn!(block = block_number, "Block timestamp still unresolved: {}", e),
                },
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.retry.max_backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DecodeError;
    use erc20::{transfer_signature, Erc20};
    use ethers::types::{Address, H256, U256};
    use mock_provider::{transfer_event, MockProvider};
    use std::time::Duration;

    fn token() -> Erc20 {
        Erc20::new(Address::repeat_byte(0x69), "PEPE".to_string(), 18)
    }

    fn event(block: u64) -> RawEvent {
        transfer_event(
            Address::repeat_byte(0x69),
            transfer_signature(),
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0xbb),
            U256::exp10(18) * U256::from(2_500u64),
            block,
            4,
            H256::repeat_byte(0x01),
        )
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn decodes_into_pending_transfer() {
        let pending = decode_event(&event(100), &token()).unwrap();
        assert_eq!(pending.transaction_hash, format!("0x{}", "01".repeat(32)));
        assert_eq!(pending.sender, format!("0x{}", "aa".repeat(20)));
        assert_eq!(pending.recipient, format!("0x{}", "bb".repeat(20)));
        assert_eq!(pending.amount, "2,500");
        assert_eq!(pending.block_number, 100);
        assert_eq!(pending.log_index, 4);
    }

    #[test]
    fn drops_incomplete_events() {
        let mut no_hash = event(100);
        no_hash.transaction_hash = None;
        assert!(matches!(
            decode_event(&no_hash, &token()),
            Err(FeedError::MissingTransactionHash)
        ));

        let mut removed = event(100);
        removed.removed = true;
        assert!(matches!(decode_event(&removed, &token()), Err(FeedError::Removed)));

        let mut garbage = event(100);
        garbage.topics.truncate(1);
        assert!(matches!(
            decode_event(&garbage, &token()),
            Err(FeedError::Decode(DecodeError::TopicCount(1)))
        ));
    }

    #[tokio::test]
    async fn caches_block_timestamps() {
        let mock = Arc::new(MockProvider::new());
        mock.set_block_timestamp(100, 1_700_000_000);
        let resolver = TimestampResolver::new(mock.clone(), policy());

        assert_eq!(resolver.resolve(100).await.unwrap(), 1_700_000_000);
        assert_eq!(resolver.resolve(100).await.unwrap(), 1_700_000_000);
        assert_eq!(mock.timestamp_lookups(), 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_request() {
        let mock = Arc::new(MockProvider::new());
        mock.set_block_timestamp(100, 1_700_000_000);
        let resolver = TimestampResolver::new(mock.clone(), policy());

        let lookups = (0..5).map(|_| resolver.resolve(100));
        let timestamps = futures::future::join_all(lookups).await;
        assert!(timestamps.iter().all(|t| matches!(t, Ok(1_700_000_000))));
        assert_eq!(mock.timestamp_lookups(), 1);
    }

    #[tokio::test]
    async fn retries_failed_lookups() {
        let mock = Arc::new(MockProvider::new());
        mock.set_block_timestamp(100, 1_700_000_000);
        mock.fail_timestamp(100, 1);
        let resolver = TimestampResolver::new(mock.clone(), policy());
        assert_eq!(resolver.resolve(100).await.unwrap(), 1_700_000_000);

        mock.set_block_timestamp(101, 1_700_000_012);
        mock.fail_timestamp(101, 5);
        assert!(resolver.resolve(101).await.is_err());
        let cancel = CancellationToken::new();
        assert_eq!(resolver.resolve_until(101, &cancel).await, Some(1_700_000_012));
    }

    #[tokio::test]
    async fn resolve_until_stops_on_cancel() {
        let mock = Arc::new(MockProvider::new());
        let resolver = TimestampResolver::new(mock, policy());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(resolver.resolve_until(404, &cancel).await, None);
    }
}
