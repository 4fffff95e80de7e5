//! Wallet sync coordinator.
//!
//! This module defines the `SyncCoordinator`, which drives every enabled wallet through one sync
//! cycle at a time:
//! - `ValidatingAddress`: the stored address type must match what the site adapter detects, and
//!   unknown buckets or invalid wallets are never synced
//! - `DiscoveringChildren`: master key wallets run the gap limit scanner first
//! - `FetchingTransactions`: history of the wallet address (or all its children) since the
//!   checkpoint, merged into one view per transaction, oldest first
//! - `ReconcilingEach`: settle direction against every address of the wallet, resolve both
//!   endpoints, insert with dedup, then advance the checkpoint
//!
//! Any error aborts the cycle of the wallet and leaves its checkpoint where the last committed
//! transaction put it. `run_all` logs the failure and moves on to the next wallet.

use crate::db::{self, DbError};
use crate::site::{SiteAdapter, SiteRegistry};
use crate::wallet::derivation::DerivationError;
use crate::wallet::sync::{
    events::{EventDispatcher, SyncEvent, SyncEventHandler},
    gap_scanner::GapLimitScanner,
    progress_tracker::{RunSummary, SyncProgressTracker, SyncStats},
    resolver::WalletResolver,
    transaction_processor::{merge_views, settle},
};
use crate::wallet::{
    AddressType, AssetId, InsertOutcome, NewTransaction, RawTransaction, RawTxType,
    TransactionType, Wallet, WalletSyncError,
};

use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// Where the coordinator is in the cycle of the current wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    ValidatingAddress,
    DiscoveringChildren,
    FetchingTransactions,
    ReconcilingEach,
}

/// Runs sync cycles for all enabled wallets, one wallet at a time.
pub struct SyncCoordinator {
    pool: SqlitePool,
    registry: SiteRegistry,
    scanner: GapLimitScanner,
    dispatcher: EventDispatcher,
    state: SyncState,
}

impl SyncCoordinator {
    pub fn new(pool: SqlitePool, registry: SiteRegistry, scanner: GapLimitScanner) -> Self {
        Self {
            pool,
            registry,
            scanner,
            dispatcher: EventDispatcher::new(),
            state: SyncState::Idle,
        }
    }

    /// Register a handler for the events of every following cycle.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.dispatcher.register_handler(handler);
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// One pass over all enabled wallets.
    ///
    /// Per-wallet failures are recorded in the summary; only failing to list the wallets is an
    /// error.
    pub async fn run_all(&mut self) -> Result<RunSummary, DbError> {
        let wallets = db::wallet::enabled_wallets(&self.pool).await?;
        info!("Starting sync pass over {} wallets", wallets.len());

        let mut summary = RunSummary::default();
        for wallet in &wallets {
            match self.sync_wallet(wallet).await {
                Ok(stats) => {
                    info!("{}", stats.summary());
                    summary.synced.push(stats);
                }
                Err(e) => summary.failed.push((wallet.id, e.to_string())),
            }
        }

        info!("Sync pass finished: {}", summary.summary());
        Ok(summary)
    }

    /// Run the full cycle of one wallet. The coordinator is back in `Idle` afterwards.
    pub async fn sync_wallet(&mut self, wallet: &Wallet) -> Result<SyncStats, WalletSyncError> {
        let mut cycle = WalletCycle {
            pool: &self.pool,
            registry: &self.registry,
            scanner: &self.scanner,
            dispatcher: &mut self.dispatcher,
            state: &mut self.state,
            wallet,
        };

        let result = cycle.run().await;
        if let Err(e) = &result {
            cycle
                .dispatcher
                .dispatch(&SyncEvent::WalletFailed {
                    wallet_id: wallet.id,
                    error: e.to_string(),
                })
                .await;
        }
        cycle.transition(SyncState::Idle).await;
        result
    }
}

/// Borrowed view of the coordinator for the cycle of a single wallet.
struct WalletCycle<'a> {
    pool: &'a SqlitePool,
    registry: &'a SiteRegistry,
    scanner: &'a GapLimitScanner,
    dispatcher: &'a mut EventDispatcher,
    state: &'a mut SyncState,
    wallet: &'a Wallet,
}

impl<'a> WalletCycle<'a> {
    async fn transition(&mut self, state: SyncState) {
        *self.state = state;
        self.dispatcher
            .dispatch(&SyncEvent::StateChanged {
                wallet_id: self.wallet.id,
                state,
            })
            .await;
    }

    async fn run(&mut self) -> Result<SyncStats, WalletSyncError> {
        let pool = self.pool;
        let wallet = self.wallet;
        let registry = self.registry;

        self.transition(SyncState::ValidatingAddress).await;
        let adapter = registry
            .get(wallet.site_id)
            .ok_or(WalletSyncError::UnsupportedSite(wallet.site_id))?;
        let address = validate(adapter, wallet)?;

        let since = db::checkpoint::get_checkpoint(pool, wallet.id).await?;
        let mut tracker = SyncProgressTracker::new(wallet.id, since);

        let addresses = if wallet.address_type.is_master_key() {
            self.transition(SyncState::DiscoveringChildren).await;
            let hd = adapter
                .hd_support()
                .ok_or(DerivationError::WalletAddressType(wallet.address_type))?;
            let discovered = self.scanner.scan(pool, wallet, hd).await?;
            tracker.record_children(discovered.len());
            for child in discovered {
                self.dispatcher
                    .dispatch(&SyncEvent::ChildDiscovered {
                        wallet_id: wallet.id,
                        child,
                    })
                    .await;
            }

            db::walletchild::children_of(pool, wallet.id)
                .await?
                .into_iter()
                .map(|child| child.address)
                .collect()
        } else {
            vec![address.to_string()]
        };

        self.transition(SyncState::FetchingTransactions).await;
        let mut raw = Vec::new();
        for address in &addresses {
            raw.extend(adapter.fetch_transactions(address, since).await?);
        }
        tracker.record_fetched(addresses.len(), raw.len());
        let raw = merge_views(raw);
        let own: HashSet<String> = addresses.into_iter().collect();

        self.transition(SyncState::ReconcilingEach).await;
        self.reconcile(&raw, &own, &mut tracker).await?;

        self.dispatcher
            .dispatch(&SyncEvent::SyncCompleted {
                wallet_id: wallet.id,
                checkpoint: tracker.checkpoint(),
            })
            .await;
        tracker.log_progress();
        Ok(tracker.get_stats())
    }

    /// Store `raw` oldest first, settled against `own`, the addresses of the wallet. The first
    /// failure aborts the remaining transactions.
    async fn reconcile(
        &mut self,
        raw: &[RawTransaction],
        own: &HashSet<String>,
        tracker: &mut SyncProgressTracker,
    ) -> Result<(), WalletSyncError> {
        let pool = self.pool;
        let wallet = self.wallet;
        let resolver = WalletResolver::new(pool, wallet.site_id, wallet.profile_id);
        let mut assets = AssetCache::default();

        for (i, tx) in raw.iter().enumerate() {
            let Some(settled) = settle(tx, own) else {
                warn!("Transaction {} does not involve wallet {}", tx.txid, wallet.id);
                continue;
            };
            let outgoing = settled.kind == RawTxType::OutgoingUndetermined;

            let owned = resolver.resolve_owned(&settled.owned).await?;
            let counterpart = resolver.resolve_counterpart(&settled.counterpart).await?;

            let kind = if counterpart.owned {
                TransactionType::MoveInternal
            } else if outgoing {
                TransactionType::MoveWithdrawal
            } else {
                TransactionType::MoveDeposit
            };
            let (from, to) = if outgoing {
                (owned, counterpart.wallet_ref)
            } else {
                (counterpart.wallet_ref, owned)
            };

            let quote_asset = assets.resolve(pool, &tx.quote_asset).await?;
            let fee_asset = assets.resolve(pool, &tx.fee_asset).await?;

            let record = NewTransaction {
                profile_id: wallet.profile_id,
                site_id: wallet.site_id,
                kind,
                timestamp: tx.timestamp,
                txid: tx.txid.clone(),
                from,
                to,
                quote_asset,
                base_asset: None,
                fee_asset,
                quantity: settled.quantity,
                fee: settled.fee,
                note: settled.kind.as_str().to_string(),
            };

            let outcome = if db::transaction::transaction_exists(pool, &record).await? {
                InsertOutcome::Duplicate
            } else {
                db::transaction::insert_transaction(pool, &record).await?
            };

            // stay on the same second while more transactions of it are pending
            let next = match raw.get(i + 1) {
                Some(following) if following.timestamp == tx.timestamp => tx.timestamp,
                _ => tx.timestamp + 1,
            };
            let checkpoint = db::checkpoint::advance_checkpoint(pool, wallet.id, next).await?;

            match outcome {
                InsertOutcome::Inserted(transaction_id) => {
                    tracker.record_committed(checkpoint);
                    self.dispatcher
                        .dispatch(&SyncEvent::TransactionCommitted {
                            wallet_id: wallet.id,
                            transaction_id,
                            txid: tx.txid.clone(),
                            kind,
                            quantity: settled.quantity,
                            timestamp: tx.timestamp,
                        })
                        .await;
                }
                InsertOutcome::Duplicate => {
                    tracker.record_duplicate(checkpoint);
                    self.dispatcher
                        .dispatch(&SyncEvent::DuplicateSkipped {
                            wallet_id: wallet.id,
                            txid: tx.txid.clone(),
                        })
                        .await;
                }
            }
        }

        Ok(())
    }
}

/// Checks done in `ValidatingAddress`, returning the address to sync.
fn validate<'w>(adapter: &dyn SiteAdapter, wallet: &'w Wallet) -> Result<&'w str, WalletSyncError> {
    match wallet.address_type {
        AddressType::Invalid => {
            return Err(WalletSyncError::InvalidWallet(format!(
                "wallet {} has an invalid address",
                wallet.id
            )));
        }
        AddressType::Unknown => {
            return Err(WalletSyncError::InvalidWallet(format!(
                "wallet {} is an unknown bucket",
                wallet.id
            )));
        }
        _ => {}
    }

    let address = wallet.address.as_deref().ok_or_else(|| {
        WalletSyncError::InvalidWallet(format!("wallet {} has no address", wallet.id))
    })?;

    let detected = adapter.validate_address(address);
    if detected != wallet.address_type {
        warn!(
            "Wallet {} is stored as {} but validates as {}",
            wallet.id,
            wallet.address_type.as_str(),
            detected.as_str()
        );
        return Err(WalletSyncError::InvalidWallet(format!(
            "wallet {} address does not match type {}",
            wallet.id,
            wallet.address_type.as_str()
        )));
    }

    Ok(address)
}

/// Asset ids by symbol, looked up once per cycle. Assets are never created here.
#[derive(Default)]
struct AssetCache {
    ids: HashMap<String, AssetId>,
}

impl AssetCache {
    async fn resolve(&mut self, pool: &SqlitePool, symbol: &str) -> Result<AssetId, WalletSyncError> {
        if let Some(id) = self.ids.get(symbol) {
            return Ok(*id);
        }
        match db::asset::find_asset_id(pool, symbol).await? {
            Some(id) => {
                self.ids.insert(symbol.to_string(), id);
                Ok(id)
            }
            None => {
                error!("Asset {} is not registered", symbol);
                Err(WalletSyncError::UnknownAsset(symbol.to_string()))
            }
        }
    }
}
