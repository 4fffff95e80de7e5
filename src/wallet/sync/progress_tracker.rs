//! Progress tracking for wallet synchronization.
//!
//! `SyncProgressTracker` counts what happens during the cycle of one wallet: discovered children,
//! fetched, committed and skipped transactions, and the checkpoint movement. `RunSummary`
//! collects the resulting `SyncStats` and the failures of one pass over all wallets.

use crate::wallet::{Timestamp, WalletId};
use tracing::{info, warn};

/// Counters for the sync cycle of a single wallet
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    wallet_id: WalletId,
    /// Checkpoint at the start of the cycle
    start_checkpoint: Timestamp,
    /// Checkpoint after the last committed or skipped transaction
    checkpoint: Timestamp,
    addresses_queried: usize,
    children_discovered: usize,
    transactions_fetched: usize,
    transactions_committed: usize,
    duplicates_skipped: usize,
}

impl SyncProgressTracker {
    /// Create a new progress tracker for a wallet at its stored checkpoint.
    pub fn new(wallet_id: WalletId, start_checkpoint: Timestamp) -> Self {
        Self {
            wallet_id,
            start_checkpoint,
            checkpoint: start_checkpoint,
            addresses_queried: 0,
            children_discovered: 0,
            transactions_fetched: 0,
            transactions_committed: 0,
            duplicates_skipped: 0,
        }
    }

    pub fn record_children(&mut self, count: usize) {
        self.children_discovered += count;
    }

    pub fn record_fetched(&mut self, addresses: usize, transactions: usize) {
        self.addresses_queried += addresses;
        self.transactions_fetched += transactions;
    }

    pub fn record_committed(&mut self, checkpoint: Timestamp) {
        self.transactions_committed += 1;
        self.record_checkpoint(checkpoint);
    }

    pub fn record_duplicate(&mut self, checkpoint: Timestamp) {
        self.duplicates_skipped += 1;
        self.record_checkpoint(checkpoint);
    }

    fn record_checkpoint(&mut self, checkpoint: Timestamp) {
        if checkpoint < self.checkpoint {
            warn!(
                "Wallet {} checkpoint {} is behind {}, keeping the later one",
                self.wallet_id, checkpoint, self.checkpoint
            );
            return;
        }
        self.checkpoint = checkpoint;
    }

    pub fn checkpoint(&self) -> Timestamp {
        self.checkpoint
    }

    /// Log the counters gathered so far
    pub fn log_progress(&self) {
        info!(
            "Wallet {} progress: {} of {} transactions stored, {} duplicates",
            self.wallet_id,
            self.transactions_committed,
            self.transactions_fetched,
            self.duplicates_skipped
        );
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            wallet_id: self.wallet_id,
            start_checkpoint: self.start_checkpoint,
            final_checkpoint: self.checkpoint,
            addresses_queried: self.addresses_queried,
            children_discovered: self.children_discovered,
            transactions_fetched: self.transactions_fetched,
            transactions_committed: self.transactions_committed,
            duplicates_skipped: self.duplicates_skipped,
        }
    }
}

/// Statistics about the sync cycle of one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub wallet_id: WalletId,
    pub start_checkpoint: Timestamp,
    pub final_checkpoint: Timestamp,
    pub addresses_queried: usize,
    pub children_discovered: usize,
    pub transactions_fetched: usize,
    pub transactions_committed: usize,
    pub duplicates_skipped: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Wallet {} from {} to {}: {} addresses, {} transactions fetched, {} stored, {} duplicates{}",
            self.wallet_id,
            self.start_checkpoint,
            self.final_checkpoint,
            self.addresses_queried,
            self.transactions_fetched,
            self.transactions_committed,
            self.duplicates_skipped,
            if self.children_discovered == 0 {
                String::new()
            } else {
                format!(" ({} new children)", self.children_discovered)
            }
        )
    }
}

/// Outcome of one pass over all enabled wallets
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub synced: Vec<SyncStats>,
    /// Wallets whose cycle was aborted, with the error message
    pub failed: Vec<(WalletId, String)>,
}

impl RunSummary {
    pub fn transactions_committed(&self) -> usize {
        self.synced.iter().map(|s| s.transactions_committed).sum()
    }

    pub fn children_discovered(&self) -> usize {
        self.synced.iter().map(|s| s.children_discovered).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} wallets synced, {} failed: {} transactions stored, {} children discovered",
            self.synced.len(),
            self.failed.len(),
            self.transactions_committed(),
            self.children_discovered()
        )
    }
}
