use crate::error::FeedError;
use crate::resolver::{decode_event, TimestampResolver};
use crate::retry::with_retry;
use config::RetryPolicy;
use contracts::TokenContract;
use futures::future::join_all;
use provider::ChainSource;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{BlockRange, PendingTransfer, Transfer};

/// Result of one historical load.
#[derive(Debug, Default)]
pub struct Backfill {
    pub range: Option<BlockRange>,
    /// Resolved transfers, newest first
    pub transfers: Vec<Transfer>,
    /// Decoded transfers whose timestamp could not be resolved in time
    pub unresolved: Vec<PendingTransfer>,
    /// Events that could not be decoded
    pub dropped: usize,
}

pub struct Backfiller {
    source: Arc<dyn ChainSource>,
    contract: Arc<dyn TokenContract>,
    resolver: Arc<TimestampResolver>,
    retry: RetryPolicy,
    window: u64,
}

impl Backfiller {
    pub fn new(
        source: Arc<dyn ChainSource>,
        contract: Arc<dyn TokenContract>,
        resolver: Arc<TimestampResolver>,
        retry: RetryPolicy,
        window: u64,
    ) -> Self {
        Backfiller {
            source,
            contract,
            resolver,
            retry,
            window,
        }
    }

    /// Loads the transfers of the `window` most recent blocks.
    ///
    /// Timestamps are resolved concurrently and the batch is returned only
    /// once every lookup has finished. A failed lookup moves its transfer to
    /// `unresolved` instead of failing the batch.
    pub async fn load_historical(
        &self,
        sender: Option<&str>,
        recipient: Option<&str>,
    ) -> Result<Backfill, FeedError> {
        let filter = self.contract.transfer_filter(sender, recipient)?;

        let source = &self.source;
        let latest = with_retry(&self.retry, "latest block lookup", || async move {
            source
                .latest_block_number()
                .await
                .map_err(FeedError::from)
        })
        .await?;
        let range = BlockRange::last(self.window, latest);

        info!(
            "Loading {} transfers from block {} to {}",
            self.contract.get_symbol(),
            range.from,
            range.to
        );
        let filter = &filter;
        let events = with_retry(&self.retry, "historical transfer query", || async move {
            source
                .query_events(filter, range)
                .await
                .map_err(FeedError::from)
        })
        .await?;

        let mut dropped = 0;
        let mut decoded = Vec::with_capacity(events.len());
        for event in &events {
            match decode_event(event, self.contract.as_ref()) {
                Ok(pending) => decoded.push(pending),
                Err(e) => {
                    debug!(tx = ?event.transaction_hash, "Dropping historical event: {}", e);
                    dropped += 1;
                }
            }
        }

        let lookups = decoded.into_iter().map(|pending| async move {
            let result = self.resolver.resolve(pending.block_number).await;
            (pending, result)
        });

        let mut transfers = vec![];
        let mut unresolved = vec![];
        for (pending, result) in join_all(lookups).await {
            match result {
                Ok(timestamp) => transfers.push(pending.resolve(timestamp)),
                Err(e) => {
                    warn!(
                        tx = %pending.transaction_hash,
                        block = pending.block_number,
                        "Historical transfer left pending: {}",
                        e
                    );
                    unresolved.push(pending);
                }
            }
        }
        transfers.sort_by(|a, b| b.chain_position().cmp(&a.chain_position()));

        info!(
            transfers = transfers.len(),
            unresolved = unresolved.len(),
            dropped,
            "Historical backfill complete"
        );
        Ok(Backfill {
            range: Some(range),
            transfers,
            unresolved,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erc20::{transfer_signature, Erc20};
    use ethers::types::{Address, H256, U256};
    use mock_provider::{transfer_event, MockProvider};
    use std::time::Duration;
    use types::RawEvent;

    const TOKEN: u8 = 0x69;

    fn event(block: u64, log_index: u64, from: u8) -> RawEvent {
        transfer_event(
            Address::repeat_byte(TOKEN),
            transfer_signature(),
            Address::repeat_byte(from),
            Address::repeat_byte(0xbb),
            U256::exp10(18),
            block,
            log_index,
            H256::from_low_u64_be(block * 100 + log_index),
        )
    }

    fn backfiller(mock: Arc<MockProvider>, window: u64) -> Backfiller {
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(1),
        };
        let contract = Arc::new(Erc20::new(Address::repeat_byte(TOKEN), "PEPE".to_string(), 18));
        let resolver = Arc::new(TimestampResolver::new(mock.clone(), retry.clone()));
        Backfiller::new(mock, contract, resolver, retry, window)
    }

    fn seeded() -> Arc<MockProvider> {
        let mock = Arc::new(MockProvider::new());
        for block in [99, 100, 101, 102] {
            mock.set_block_timestamp(block, 1_000 + block as i64);
        }
        mock.add_history(event(99, 0, 0xaa));
        mock.add_history(event(101, 0, 0xaa));
        mock.add_history(event(100, 0, 0xcc));
        mock.add_history(event(102, 1, 0xaa));
        mock.add_history(event(102, 0, 0xcc));
        mock
    }

    #[tokio::test]
    async fn loads_window_newest_first() {
        let backfill = backfiller(seeded(), 3)
            .load_historical(None, None)
            .await
            .unwrap();
        assert_eq!(backfill.range, Some(BlockRange { from: 100, to: 102 }));
        let positions: Vec<(u64, u64)> =
            backfill.transfers.iter().map(|t| t.chain_position()).collect();
        assert_eq!(positions, vec![(102, 1), (102, 0), (101, 0), (100, 0)]);
        assert!(backfill.transfers.iter().all(|t| t.timestamp == 1_000 + t.block_number as i64));
    }

    #[tokio::test]
    async fn applies_query_filters() {
        let sender = format!("{:#x}", Address::repeat_byte(0xaa));
        let backfill = backfiller(seeded(), 100)
            .load_historical(Some(&sender), None)
            .await
            .unwrap();
        assert_eq!(backfill.transfers.len(), 3);
        assert!(backfill.transfers.iter().all(|t| t.sender == sender));
    }

    #[tokio::test]
    async fn failed_lookup_does_not_abort_batch() {
        let mock = seeded();
        mock.fail_timestamp(101, 10);
        let backfill = backfiller(mock, 3).load_historical(None, None).await.unwrap();
        assert_eq!(backfill.transfers.len(), 3);
        assert_eq!(backfill.unresolved.len(), 1);
        assert_eq!(backfill.unresolved[0].block_number, 101);
    }

    #[tokio::test]
    async fn drops_undecodable_events() {
        let mock = seeded();
        let mut broken = event(102, 5, 0xaa);
        broken.data = Default::default();
        mock.add_history(broken);
        let backfill = backfiller(mock, 3).load_historical(None, None).await.unwrap();
        assert_eq!(backfill.dropped, 1);
        assert_eq!(backfill.transfers.len(), 4);
    }

    #[tokio::test]
    async fn one_lookup_per_block() {
        let mock = Arc::new(MockProvider::new());
        mock.set_block_timestamp(100, 1_100);
        for log_index in 0..5 {
            mock.add_history(event(100, log_index, 0xaa));
        }
        let backfill = backfiller(mock.clone(), 3).load_historical(None, None).await.unwrap();
        assert_eq!(backfill.transfers.len(), 5);
        assert_eq!(mock.timestamp_lookups(), 1);
    }

    #[tokio::test]
    async fn query_outage_is_bounded() {
        let mock = seeded();
        mock.fail_queries(5);
        let result = backfiller(mock, 3).load_historical(None, None).await;
        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 2, .. })));
    }
}
