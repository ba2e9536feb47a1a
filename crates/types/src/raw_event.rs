use ethers::types::{Address, Bytes, Log, H256};

/// Undecoded log record as delivered by a chain data source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub transaction_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    /// Set by the node when the log was dropped by a chain reorganisation
    pub removed: bool,
}

impl RawEvent {
    /// Lowercase `0x` prefixed transaction hash, if the node provided one.
    pub fn transaction_hash_hex(&self) -> Option<String> {
        self.transaction_hash.map(|hash| format!("{:#x}", hash))
    }
}

impl From<Log> for RawEvent {
    fn from(log: Log) -> Self {
        RawEvent {
            address: log.address,
            topics: log.topics,
            data: log.data,
            transaction_hash: log.transaction_hash,
            block_number: log.block_number.map(|n| n.as_u64()),
            log_index: log.log_index.map(|i| i.low_u64()),
            removed: log.removed.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{U256, U64};

    #[test]
    fn converts_node_log() {
        let log = Log {
            transaction_hash: Some(H256::repeat_byte(0xab)),
            block_number: Some(U64::from(17_000_000u64)),
            log_index: Some(U256::from(7u64)),
            removed: Some(true),
            ..Default::default()
        };

        let raw = RawEvent::from(log);
        assert_eq!(raw.block_number, Some(17_000_000));
        assert_eq!(raw.log_index, Some(7));
        assert!(raw.removed);
        assert_eq!(
            raw.transaction_hash_hex().unwrap(),
            format!("0x{}", "ab".repeat(32))
        );
    }

    #[test]
    fn missing_hash_stays_missing() {
        let raw = RawEvent::from(Log::default());
        assert_eq!(raw.transaction_hash_hex(), None);
        assert!(!raw.removed);
    }
}
