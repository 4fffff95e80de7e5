//! Remote ledger integration for blockchain explorers
//!
//! This module provides the client and payload types for fetching address usage summaries and
//! paginated transaction history from a blockchain.info style HTTP API. Other providers plug in
//! by implementing the `RemoteLedger` trait.

/// HTTP client with retry and rate limit handling
mod client;
/// Payload and error types of the explorer API
mod types;

pub use client::{BlockchainInfoClient, RemoteLedger};
pub use types::*;
