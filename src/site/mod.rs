//! Site adapters and the registry that maps site ids to them.
//!
//! Every supported chain or exchange implements [`SiteAdapter`]. Optional capabilities are
//! separate traits exposed through accessor methods, so callers check for a capability instead
//! of invoking a method that may not be supported:
//! - [`HdSupport`] for sites whose wallets can be master public keys with derived children.

pub mod btc;

use crate::config::AppConfig;
use crate::db;
use crate::explorer::BlockchainInfoClient;
use crate::wallet::derivation::{ChildDeriver, DerivationError};
use crate::wallet::{AddressType, RawTransaction, SiteId, Timestamp, WalletSyncError};

use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub use btc::Bitcoin;

/// Core capabilities every site provides.
#[async_trait::async_trait]
pub trait SiteAdapter: Send + Sync {
	fn site_id(&self) -> SiteId;

	fn name(&self) -> &'static str;

	/// Classify an address string. Never fails, unusable strings are `AddressType::Invalid`.
	fn validate_address(&self, address: &str) -> AddressType;

	/// Classified transactions of `address` with a timestamp at or after `since`, newest first.
	async fn fetch_transactions(
		&self,
		address: &str,
		since: Timestamp,
	) -> Result<Vec<RawTransaction>, WalletSyncError>;

	/// HD derivation capability, when the site supports master key wallets.
	fn hd_support(&self) -> Option<&dyn HdSupport> {
		None
	}
}

/// Derivation and cheap usage lookups for master key wallets.
#[async_trait::async_trait]
pub trait HdSupport: Send + Sync {
	fn deriver(
		&self,
		key: &str,
		address_type: AddressType,
	) -> Result<Box<dyn ChildDeriver>, DerivationError>;

	/// Transaction count per address. Addresses missing from the map have no activity.
	async fn lookup_usage(&self, addresses: &[String]) -> Result<HashMap<String, u64>, WalletSyncError>;
}

/// Static mapping from site id to adapter, filled once at startup.
#[derive(Default)]
pub struct SiteRegistry {
	adapters: BTreeMap<SiteId, Box<dyn SiteAdapter>>,
}

impl SiteRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every supported site, wired to the configured remote endpoints.
	pub fn from_config(config: &AppConfig) -> Result<Self, WalletSyncError> {
		let network = config.network()?;
		let client = BlockchainInfoClient::new(config.remote.clone())?;

		let mut registry = Self::new();
		registry.register(Box::new(Bitcoin::new(client, network)));
		Ok(registry)
	}

	pub fn register(&mut self, adapter: Box<dyn SiteAdapter>) {
		info!("Registered site adapter {} ({})", adapter.name(), adapter.site_id());
		self.adapters.insert(adapter.site_id(), adapter);
	}

	pub fn get(&self, site_id: SiteId) -> Option<&dyn SiteAdapter> {
		self.adapters.get(&site_id).map(|adapter| adapter.as_ref())
	}

	pub fn len(&self) -> usize {
		self.adapters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.adapters.is_empty()
	}

	/// Insert a `site` row for every registered adapter that has none yet.
	pub async fn register_sites(&self, pool: &SqlitePool) -> Result<(), db::DbError> {
		for adapter in self.adapters.values() {
			db::site::ensure_site(pool, adapter.site_id(), adapter.name()).await?;
		}
		Ok(())
	}
}
