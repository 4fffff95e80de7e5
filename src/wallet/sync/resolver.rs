use crate::db::{self, DbError};
use crate::wallet::{BranchType, ProfileId, SiteId, WalletRef, WalletSyncError};

use sqlx::SqlitePool;
use tracing::debug;

/// A resolved transaction endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
	pub wallet_ref: WalletRef,
	/// Whether the endpoint belongs to the profile.
	pub owned: bool,
}

/// Maps address strings to persisted wallets within one (site, profile).
pub struct WalletResolver<'a> {
	pool: &'a SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
}

impl<'a> WalletResolver<'a> {
	pub fn new(pool: &'a SqlitePool, site_id: SiteId, profile_id: ProfileId) -> Self {
		Self {
			pool,
			site_id,
			profile_id,
		}
	}

	/// Find a registered or derived address of the profile.
	///
	/// # Errors
	/// `DbError::NoWalletFound` when the address is unknown or only known as a counterpart.
	pub async fn resolve_owned(&self, address: &str) -> Result<WalletRef, WalletSyncError> {
		match self.lookup(address).await? {
			Some(Resolved {
				wallet_ref,
				owned: true,
			}) => Ok(wallet_ref),
			_ => Err(DbError::NoWalletFound(address.to_string()).into()),
		}
	}

	/// Find any known address, or park it as a child of the unknown bucket.
	///
	/// Repeated calls for the same address return the same child.
	pub async fn resolve_counterpart(&self, address: &str) -> Result<Resolved, WalletSyncError> {
		if let Some(found) = self.lookup(address).await? {
			return Ok(found);
		}

		let bucket =
			db::wallet::ensure_unknown_bucket(self.pool, self.site_id, self.profile_id).await?;
		if db::walletchild::insert_walletchild(
			self.pool,
			bucket,
			address,
			BranchType::Undifferentiated,
			true,
		)
		.await?
		.is_some()
		{
			debug!("Parked counterpart {} in unknown bucket {}", address, bucket);
		}

		// address uniqueness is global, the row may sit below another profile's wallet
		let child = db::walletchild::find_child_by_address(self.pool, address)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("wallet child {}", address)))?;
		if child.parent_id != bucket {
			debug!(
				"Counterpart {} of profile {} is child {} of wallet {} outside the profile",
				address, self.profile_id, child.id, child.parent_id
			);
		}

		Ok(Resolved {
			wallet_ref: WalletRef::Child {
				wallet: child.parent_id,
				child: child.id,
			},
			owned: false,
		})
	}

	/// Wallets first, then children of the profile's wallets.
	async fn lookup(&self, address: &str) -> Result<Option<Resolved>, DbError> {
		let wallet =
			db::wallet::find_wallet_by_address(self.pool, self.site_id, self.profile_id, address)
				.await?;
		if let Some(wallet) = wallet {
			return Ok(Some(Resolved {
				wallet_ref: WalletRef::Wallet(wallet.id),
				owned: wallet.owned,
			}));
		}

		let child =
			db::walletchild::find_child_for_profile(self.pool, self.site_id, self.profile_id, address)
				.await?;
		match child {
			Some(child) => {
				let parent = db::wallet::get_wallet(self.pool, child.parent_id).await?;
				Ok(Some(Resolved {
					wallet_ref: WalletRef::Child {
						wallet: parent.id,
						child: child.id,
					},
					owned: parent.owned,
				}))
			}
			None => Ok(None),
		}
	}
}
