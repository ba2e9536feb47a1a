use ethers::types::{Address, H256};

/// Log filter for a single event signature of a single contract.
///
/// `sender` and `recipient` map to the first and second indexed topics and
/// are matched exactly by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub address: Address,
    pub signature: H256,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
}

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// The `window` most recent blocks ending at `latest`.
    pub fn last(window: u64, latest: u64) -> Self {
        BlockRange {
            from: latest.saturating_sub(window.saturating_sub(1)),
            to: latest,
        }
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.from && block <= self.to
    }
}
