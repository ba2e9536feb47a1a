use std::collections::{HashMap, HashSet};
use tracing::debug;
use types::Transfer;

/// Authoritative transfer collection.
///
/// Entries are unique by transaction hash and kept newest first by
/// `(block_number, log_index)`. When one transaction carries several
/// transfers, the earliest log is kept whatever the arrival order.
/// Transfers whose timestamp is still being resolved are tracked as pending
/// and never enter the collection until they are resolved.
#[derive(Debug, Default)]
pub struct Reconciler {
    transfers: Vec<Transfer>,
    /// Chain position of the kept entry per hash
    seen: HashMap<String, (u64, u64)>,
    pending: HashSet<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn contains(&self, transaction_hash: &str) -> bool {
        self.seen.contains_key(transaction_hash)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn latest_block(&self) -> Option<u64> {
        self.transfers.first().map(|t| t.block_number)
    }

    /// Records a decoded transfer that waits for its timestamp. Returns false
    /// when the hash is already known.
    pub fn mark_pending(&mut self, transaction_hash: &str) -> bool {
        if self.seen.contains_key(transaction_hash) {
            return false;
        }
        self.pending.insert(transaction_hash.to_string())
    }

    /// Merges a completed historical batch. Returns how many entries were
    /// added or replaced.
    pub fn merge_historical(&mut self, batch: Vec<Transfer>) -> usize {
        let mut added = 0;
        for transfer in batch {
            if self.accept(&transfer) {
                self.transfers.push(transfer);
                added += 1;
            }
        }
        if added > 0 {
            self.transfers
                .sort_by(|a, b| b.chain_position().cmp(&a.chain_position()));
        }
        added
    }

    /// Inserts a single resolved transfer at its newest-first position, which
    /// is the head for anything delivered live. Returns false when the hash
    /// is already held at the same or an earlier position.
    pub fn insert(&mut self, transfer: Transfer) -> bool {
        if !self.accept(&transfer) {
            return false;
        }
        let position = transfer.chain_position();
        let index = self
            .transfers
            .partition_point(|existing| existing.chain_position() > position);
        if index != 0 {
            debug!(
                block = transfer.block_number,
                head = ?self.latest_block(),
                "Transfer arrived behind the head"
            );
        }
        self.transfers.insert(index, transfer);
        true
    }

    fn accept(&mut self, transfer: &Transfer) -> bool {
        let hash = &transfer.transaction_hash;
        self.pending.remove(hash);
        let position = transfer.chain_position();
        match self.seen.get(hash) {
            Some(kept) if *kept <= position => return false,
            Some(_) => self.transfers.retain(|t| &t.transaction_hash != hash),
            None => {}
        }
        self.seen.insert(hash.clone(), position);
        true
    }
}
