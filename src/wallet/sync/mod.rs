//! Wallet Synchronization Module
//!
//! This module provides the engine that keeps the local ledger in line with on-chain activity of
//! the registered wallets. It is composed of several submodules, each responsible for a specific
//! aspect of the sync process:
//!
//! - `orchestrator`: The `SyncCoordinator` state machine that drives one wallet at a time.
//! - `events`: Event types and handler traits used to observe a sync pass.
//! - `gap_scanner`: Discovers used child addresses of master key wallets under a gap limit.
//! - `resolver`: Maps addresses to owned wallets or parks counterparts in the unknown bucket.
//! - `progress_tracker`: Per-wallet counters and the summary of a pass.
//! - `transaction_processor`: Provider specific classification into `RawTransaction`s.
//!
//! Progress is resumable: transactions are inserted oldest first with a dedup key and the
//! per-wallet checkpoint only advances after a committed (or already present) transaction.

/// Event system for observing sync progress
pub mod events;
/// Gap limit discovery of derived child addresses
pub mod gap_scanner;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Address to wallet resolution
pub mod resolver;
/// Transaction classification per provider
pub mod transaction_processor;

pub use orchestrator::*;
