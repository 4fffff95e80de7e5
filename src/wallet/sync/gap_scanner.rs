use crate::config::ScannerConfig;
use crate::db;
use crate::site::HdSupport;
use crate::wallet::derivation::ChildDeriver;
use crate::wallet::{AddressType, BranchType, ChildId, Wallet, WalletChild, WalletSyncError};

use sqlx::SqlitePool;
use tracing::{debug, info};

/// Discovers the used child addresses of a master key wallet.
///
/// Each derivable branch is scanned on its own: starting at the number of children already
/// stored for the branch, batches of consecutive addresses are derived and looked up until a batch
/// without any activity is found. Used addresses are persisted as `WalletChild` rows; rows that
/// already exist are left alone, so reruns are cheap and never duplicate a child.
#[derive(Debug, Clone)]
pub struct GapLimitScanner {
	config: ScannerConfig,
}

impl GapLimitScanner {
	pub fn new(config: ScannerConfig) -> Self {
		Self { config }
	}

	/// Scan both branches of `wallet`, returning the children created by this run.
	pub async fn scan(
		&self,
		pool: &SqlitePool,
		wallet: &Wallet,
		hd: &dyn HdSupport,
	) -> Result<Vec<WalletChild>, WalletSyncError> {
		let key = wallet.address.as_deref().ok_or_else(|| {
			WalletSyncError::InvalidWallet(format!("wallet {} has no master key", wallet.id))
		})?;
		let deriver = hd.deriver(key, wallet.address_type)?;

		let mut discovered = Vec::new();
		for branch in BranchType::DERIVABLE {
			let found = self
				.scan_branch(pool, wallet, deriver.as_ref(), hd, branch)
				.await?;
			discovered.extend(found);
		}

		if !discovered.is_empty() {
			db::wallet::set_has_children(pool, wallet.id).await?;
		}
		info!(
			"Gap limit scan of wallet {} found {} new children",
			wallet.id,
			discovered.len()
		);
		Ok(discovered)
	}

	async fn scan_branch(
		&self,
		pool: &SqlitePool,
		wallet: &Wallet,
		deriver: &dyn ChildDeriver,
		hd: &dyn HdSupport,
		branch: BranchType,
	) -> Result<Vec<WalletChild>, WalletSyncError> {
		let batch_size = self.config.batch_size.max(1);
		let mut cursor = db::walletchild::count_children(pool, wallet.id, branch).await?;
		let mut discovered = Vec::new();

		loop {
			let batch = deriver.derive_range(branch, cursor, batch_size)?;
			let usage = hd.lookup_usage(&batch).await?;

			let mut batch_used = false;
			for address in &batch {
				if usage.get(address).copied().unwrap_or(0) == 0 {
					continue;
				}
				batch_used = true;

				let inserted =
					db::walletchild::insert_walletchild(pool, wallet.id, address, branch, true)
						.await?;
				let id = match inserted {
					Some(id) => id,
					None => match adopt_parked(pool, wallet, address, branch).await? {
						Some(id) => id,
						None => continue,
					},
				};
				debug!("Wallet {} {} child {}", wallet.id, branch.as_str(), address);
				discovered.push(WalletChild {
					id,
					parent_id: wallet.id,
					address: address.clone(),
					branch,
					used: true,
				});
			}

			if !batch_used {
				debug!(
					"Gap limit reached for wallet {} {} branch at index {}",
					wallet.id,
					branch.as_str(),
					cursor
				);
				break;
			}
			cursor = cursor.saturating_add(batch_size);
		}

		Ok(discovered)
	}
}

/// Take over `address` when it was parked below the unknown bucket of the wallet's profile,
/// which happens when it showed up as a counterpart before its master key was registered.
async fn adopt_parked(
	pool: &SqlitePool,
	wallet: &Wallet,
	address: &str,
	branch: BranchType,
) -> Result<Option<ChildId>, WalletSyncError> {
	let Some(existing) = db::walletchild::find_child_by_address(pool, address).await? else {
		return Ok(None);
	};
	if existing.parent_id == wallet.id {
		return Ok(None);
	}

	let holder = db::wallet::get_wallet(pool, existing.parent_id).await?;
	let parked = holder.address_type == AddressType::Unknown
		&& holder.site_id == wallet.site_id
		&& holder.profile_id == wallet.profile_id;
	if !parked {
		debug!(
			"Derived address {} already belongs to wallet {}",
			address, existing.parent_id
		);
		return Ok(None);
	}

	db::walletchild::adopt_child(pool, existing.id, wallet.id, branch).await?;
	info!(
		"Moved {} from unknown bucket {} to wallet {}",
		address, holder.id, wallet.id
	);
	Ok(Some(existing.id))
}
