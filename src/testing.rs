//! Shared fixtures for unit tests: in-memory databases, seed rows and in-memory remote fakes.

use crate::db;
use crate::explorer::{
	AddressSummary, ApiInput, ApiOutput, ApiTransaction, RawAddrResponse, RemoteError, RemoteLedger,
};
use crate::site::HdSupport;
use crate::site::btc::{BITCOIN_SITE_ID, BTC_DECIMALS, BTC_SYMBOL};
use crate::wallet::derivation::{ChildDeriver, DerivationError};
use crate::wallet::{
	AddressType, AssetId, BranchType, NewWallet, ProfileId, SiteId, WalletId, WalletSyncError,
};

use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

// BIP32 test vector 1, chain m
pub const TEST_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
// Uncompressed secp256k1 generator point without the 0x04 prefix
pub const ELECTRUM_MPK: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

pub async fn memory_pool() -> SqlitePool {
	let pool = db::create_pool("sqlite::memory:").await.unwrap();
	db::run_migrations(&pool).await.unwrap();
	pool
}

pub async fn seed_profile(pool: &SqlitePool) -> ProfileId {
	db::profile::insert_profile(pool, "alice").await.unwrap()
}

pub async fn seed_site(pool: &SqlitePool) -> SiteId {
	db::site::ensure_site(pool, BITCOIN_SITE_ID, "Bitcoin")
		.await
		.unwrap();
	BITCOIN_SITE_ID
}

pub async fn seed_asset(pool: &SqlitePool) -> AssetId {
	db::asset::insert_asset(pool, "Bitcoin", BTC_SYMBOL, BTC_DECIMALS as u8)
		.await
		.unwrap()
}

pub async fn seed_wallet(
	pool: &SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
	address: &str,
	address_type: AddressType,
	owned: bool,
) -> WalletId {
	db::wallet::insert_wallet(
		pool,
		&NewWallet {
			site_id,
			profile_id,
			name: format!("wallet {}", address),
			address: address.to_string(),
			address_type,
			owned,
			enabled: owned,
		},
	)
	.await
	.unwrap()
}

pub async fn seed_master_wallet(
	pool: &SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
	key: &str,
) -> WalletId {
	seed_wallet(pool, site_id, profile_id, key, AddressType::Xpub, true).await
}

/// Explorer transaction paying from `inputs` to `outputs`, `(address, satoshi)` each.
pub fn api_tx(
	hash: &str,
	time: i64,
	fee: i64,
	inputs: &[(&str, i64)],
	outputs: &[(&str, i64)],
) -> ApiTransaction {
	ApiTransaction {
		time,
		hash: hash.to_string(),
		fee,
		inputs: inputs
			.iter()
			.map(|(addr, value)| ApiInput {
				prev_out: Some(ApiOutput {
					addr: Some(addr.to_string()),
					value: *value,
				}),
			})
			.collect(),
		out: outputs
			.iter()
			.map(|(addr, value)| ApiOutput {
				addr: Some(addr.to_string()),
				value: *value,
			})
			.collect(),
	}
}

#[derive(Default)]
struct LedgerState {
	histories: HashMap<String, Vec<ApiTransaction>>,
	failing: HashSet<String>,
	page_requests: Vec<(String, usize)>,
	usage_lookups: Vec<Vec<String>>,
}

/// In-memory explorer. Clones share state, so a test can keep a handle after moving one into a
/// site adapter.
#[derive(Clone)]
pub struct FakeLedger {
	state: Arc<Mutex<LedgerState>>,
	page_size: usize,
}

impl FakeLedger {
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(LedgerState::default())),
			page_size: 50,
		}
	}

	pub fn with_page_size(mut self, page_size: usize) -> Self {
		self.page_size = page_size;
		self
	}

	/// Append transactions to the history of `address`, kept newest first.
	pub fn add_history(&self, address: &str, txs: Vec<ApiTransaction>) {
		let mut state = self.state.lock().unwrap();
		let history = state.histories.entry(address.to_string()).or_default();
		history.extend(txs);
		history.sort_by(|a, b| b.time.cmp(&a.time));
	}

	/// Every request touching `address` fails with a 503.
	pub fn fail_address(&self, address: &str) {
		self.state
			.lock()
			.unwrap()
			.failing
			.insert(address.to_string());
	}

	pub fn requested_offsets(&self, address: &str) -> Vec<usize> {
		self.state
			.lock()
			.unwrap()
			.page_requests
			.iter()
			.filter(|(requested, _)| requested == address)
			.map(|(_, offset)| *offset)
			.collect()
	}

	pub fn page_requests(&self) -> usize {
		self.state.lock().unwrap().page_requests.len()
	}

	pub fn usage_lookups(&self) -> Vec<Vec<String>> {
		self.state.lock().unwrap().usage_lookups.clone()
	}
}

fn unavailable(address: &str) -> RemoteError {
	RemoteError::new(format!("{} unavailable", address), Some(503))
}

#[async_trait::async_trait]
impl RemoteLedger for FakeLedger {
	async fn address_page(
		&self,
		address: &str,
		offset: usize,
	) -> Result<RawAddrResponse, RemoteError> {
		let mut state = self.state.lock().unwrap();
		state.page_requests.push((address.to_string(), offset));
		if state.failing.contains(address) {
			return Err(unavailable(address));
		}

		let history = state.histories.get(address).cloned().unwrap_or_default();
		Ok(RawAddrResponse {
			n_tx: history.len() as u64,
			final_balance: 0,
			txs: history
				.into_iter()
				.skip(offset)
				.take(self.page_size)
				.collect(),
		})
	}

	async fn address_usage(
		&self,
		addresses: &[String],
	) -> Result<HashMap<String, AddressSummary>, RemoteError> {
		let mut state = self.state.lock().unwrap();
		state.usage_lookups.push(addresses.to_vec());
		if let Some(address) = addresses.iter().find(|a| state.failing.contains(*a)) {
			return Err(unavailable(address));
		}

		Ok(addresses
			.iter()
			.filter_map(|address| {
				let history = state.histories.get(address)?;
				Some((
					address.clone(),
					AddressSummary {
						n_tx: history.len() as u64,
						..AddressSummary::default()
					},
				))
			})
			.collect())
	}
}

/// Derives readable fake addresses `<key>/<branch>/<index>`.
pub struct FakeDeriver {
	key: String,
}

impl ChildDeriver for FakeDeriver {
	fn derive(&self, branch: BranchType, index: u32) -> Result<String, DerivationError> {
		let selector = branch
			.selector()
			.ok_or(DerivationError::ChildAddressType(branch))?;
		Ok(format!("{}/{}/{}", self.key, selector, index))
	}
}

/// HD capability over `FakeDeriver` and a `FakeLedger`.
pub struct FakeHd {
	pub ledger: FakeLedger,
}

#[async_trait::async_trait]
impl HdSupport for FakeHd {
	fn deriver(
		&self,
		key: &str,
		address_type: AddressType,
	) -> Result<Box<dyn ChildDeriver>, DerivationError> {
		if !address_type.is_master_key() {
			return Err(DerivationError::WalletAddressType(address_type));
		}
		Ok(Box::new(FakeDeriver {
			key: key.to_string(),
		}))
	}

	async fn lookup_usage(&self, addresses: &[String]) -> Result<HashMap<String, u64>, WalletSyncError> {
		let usage = self.ledger.address_usage(addresses).await?;
		Ok(usage
			.into_iter()
			.map(|(address, summary)| (address, summary.n_tx))
			.collect())
	}
}
