use serde::{Deserialize, Serialize};

/// A token transfer whose block timestamp has been resolved.
///
/// Only resolved transfers ever enter the feed collection; anything still
/// waiting on its block timestamp is a [`PendingTransfer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub transaction_hash: String,
    pub sender: String,
    pub recipient: String,
    /// Human readable quantity, already scaled by the token decimals
    pub amount: String,
    pub block_number: u64,
    pub log_index: u64,
    /// Block production time in unix seconds
    pub timestamp: i64,
}

impl Transfer {
    /// Position of the transfer on chain. Newer transfers compare greater.
    pub fn chain_position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A decoded transfer that still waits for its block timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub transaction_hash: String,
    pub sender: String,
    pub recipient: String,
    pub amount: String,
    pub block_number: u64,
    pub log_index: u64,
}

impl PendingTransfer {
    pub fn resolve(self, timestamp: i64) -> Transfer {
        Transfer {
            transaction_hash: self.transaction_hash,
            sender: self.sender,
            recipient: self.recipient,
            amount: self.amount,
            block_number: self.block_number,
            log_index: self.log_index,
            timestamp,
        }
    }
}
