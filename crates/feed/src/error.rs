use contracts::DecodeError;
use provider::ProviderError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("undecodable event: {0}")]
    Decode(#[from] DecodeError),
    #[error("event has no transaction hash")]
    MissingTransactionHash,
    #[error("event has no block number")]
    MissingBlockNumber,
    #[error("event was removed by a reorg")]
    Removed,
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: Box<FeedError>,
    },
    #[error("feed session is closed")]
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("{0:?} is not an account identifier")]
    Malformed(String),
}
