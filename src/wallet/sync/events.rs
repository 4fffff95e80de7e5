//! Event system for wallet synchronization.
//!
//! The coordinator emits events for every state transition, discovered child address, committed
//! or skipped transaction, and per-wallet failure. Registered handlers consume them, which keeps
//! logging and any further side effects out of the reconciliation logic.

use crate::utils::{format_timestamp, format_token_amount};
use crate::wallet::sync::orchestrator::SyncState;
use crate::wallet::{Timestamp, TransactionType, WalletChild, WalletId, WalletSyncError};
use tracing::{debug, error, info};

/// Events that occur during wallet synchronization
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The coordinator entered a new state for a wallet
    StateChanged {
        wallet_id: WalletId,
        state: SyncState,
    },
    /// The gap limit scanner stored a new used child address
    ChildDiscovered {
        wallet_id: WalletId,
        child: WalletChild,
    },
    /// A transaction was inserted and the checkpoint advanced
    TransactionCommitted {
        wallet_id: WalletId,
        transaction_id: i64,
        txid: String,
        kind: TransactionType,
        quantity: i64,
        timestamp: Timestamp,
    },
    /// A transaction with the same dedup key was already stored
    DuplicateSkipped { wallet_id: WalletId, txid: String },
    /// The cycle of a wallet was aborted; its checkpoint stays where it was
    WalletFailed { wallet_id: WalletId, error: String },
    /// The cycle of a wallet finished
    SyncCompleted {
        wallet_id: WalletId,
        checkpoint: Timestamp,
    },
}

/// Trait for handling sync events.
///
/// Implementors receive all sync events and can perform side effects or state updates.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order; a failing handler does not stop the others.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&mut self, event: &SyncEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Writes every event to the log.
pub struct LoggingEventHandler {
    decimals: u32,
}

impl LoggingEventHandler {
    /// `decimals` of the amounts carried by committed transactions.
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }
}

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError> {
        match event {
            SyncEvent::StateChanged { wallet_id, state } => {
                debug!("Wallet {} -> {:?}", wallet_id, state);
            }
            SyncEvent::ChildDiscovered { wallet_id, child } => {
                info!(
                    "Wallet {} discovered {} address {}",
                    wallet_id,
                    child.branch.as_str(),
                    child.address
                );
            }
            SyncEvent::TransactionCommitted {
                wallet_id,
                transaction_id,
                txid,
                kind,
                quantity,
                timestamp,
            } => {
                info!(
                    "Wallet {} stored transaction {} ({}) {:?} of {} at {}",
                    wallet_id,
                    transaction_id,
                    txid,
                    kind,
                    format_token_amount(*quantity, self.decimals),
                    format_timestamp(*timestamp)
                );
            }
            SyncEvent::DuplicateSkipped { wallet_id, txid } => {
                debug!("Wallet {} already has transaction {}", wallet_id, txid);
            }
            SyncEvent::WalletFailed { wallet_id, error } => {
                error!("Wallet {} sync failed: {}", wallet_id, error);
            }
            SyncEvent::SyncCompleted {
                wallet_id,
                checkpoint,
            } => {
                info!(
                    "Wallet {} synced up to {}",
                    wallet_id,
                    format_timestamp(*checkpoint)
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl SyncEventHandler for Recorder {
        async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError> {
            self.0.lock().unwrap().push(format!("{:?}", event));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl SyncEventHandler for Failing {
        async fn handle(&mut self, _event: &SyncEvent) -> Result<(), WalletSyncError> {
            Err(WalletSyncError::InvalidWallet("boom".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(Failing));
        dispatcher.register_handler(Box::new(LoggingEventHandler::new(8)));
        dispatcher.register_handler(Box::new(Recorder(seen.clone())));

        dispatcher
            .dispatch(&SyncEvent::DuplicateSkipped {
                wallet_id: 1,
                txid: "abc".to_string(),
            })
            .await;
        dispatcher
            .dispatch(&SyncEvent::SyncCompleted {
                wallet_id: 1,
                checkpoint: 10,
            })
            .await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
