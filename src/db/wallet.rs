use super::{DbError, at_most_one};
use crate::wallet::{AddressType, NewWallet, ProfileId, SiteId, Wallet, WalletId};

use sqlx::SqlitePool;
use tracing::info;

const UNKNOWN_BUCKET_NAME: &str = "Unknown";

#[derive(sqlx::FromRow)]
struct WalletRow {
	id: i64,
	site_id: i64,
	profile_id: i64,
	name: Option<String>,
	address: Option<String>,
	addresstype: String,
	owned: bool,
	enabled: bool,
	haschild: bool,
}

impl From<WalletRow> for Wallet {
	fn from(row: WalletRow) -> Self {
		Wallet {
			id: row.id,
			site_id: row.site_id,
			profile_id: row.profile_id,
			name: row.name,
			address: row.address,
			address_type: AddressType::from_db(&row.addresstype),
			owned: row.owned,
			enabled: row.enabled,
			has_children: row.haschild,
		}
	}
}

const WALLET_COLUMNS: &str =
	"w.id, w.site_id, w.profile_id, w.name, w.address, w.addresstype, w.owned, w.enabled, w.haschild";

/// Register a wallet. Address strings are unique per site.
pub async fn insert_wallet(pool: &SqlitePool, wallet: &NewWallet) -> Result<WalletId, DbError> {
	let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM wallet WHERE site_id = ? AND address = ?")
		.bind(wallet.site_id)
		.bind(&wallet.address)
		.fetch_optional(pool)
		.await?;
	if existing.is_some() {
		return Err(DbError::Duplicate(format!(
			"wallet {} on site {}",
			wallet.address, wallet.site_id
		)));
	}

	let result = sqlx::query(
		r#"
		INSERT INTO wallet (site_id, profile_id, name, address, addresstype, owned, enabled, haschild)
		VALUES (?, ?, ?, ?, ?, ?, ?, 0)
		"#,
	)
	.bind(wallet.site_id)
	.bind(wallet.profile_id)
	.bind(&wallet.name)
	.bind(&wallet.address)
	.bind(wallet.address_type.as_str())
	.bind(wallet.owned)
	.bind(wallet.enabled)
	.execute(pool)
	.await?;

	Ok(result.last_insert_rowid())
}

pub async fn get_wallet(pool: &SqlitePool, id: WalletId) -> Result<Wallet, DbError> {
	let row = sqlx::query_as::<_, WalletRow>(&format!(
		"SELECT {} FROM wallet w WHERE w.id = ?",
		WALLET_COLUMNS
	))
	.bind(id)
	.fetch_optional(pool)
	.await?;

	row.map(Wallet::from)
		.ok_or_else(|| DbError::NotFound(format!("wallet {}", id)))
}

/// Exact address match among the wallets of one (site, profile).
pub async fn find_wallet_by_address(
	pool: &SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
	address: &str,
) -> Result<Option<Wallet>, DbError> {
	let rows = sqlx::query_as::<_, WalletRow>(&format!(
		"SELECT {} FROM wallet w WHERE w.site_id = ? AND w.profile_id = ? AND w.address = ?",
		WALLET_COLUMNS
	))
	.bind(site_id)
	.bind(profile_id)
	.bind(address)
	.fetch_all(pool)
	.await?;

	Ok(at_most_one(rows, "wallet", address)?.map(Wallet::from))
}

/// Wallets to visit in a sync pass: enabled wallets of enabled sites and profiles, oldest first.
pub async fn enabled_wallets(pool: &SqlitePool) -> Result<Vec<Wallet>, DbError> {
	let rows = sqlx::query_as::<_, WalletRow>(&format!(
		r#"
		SELECT {}
		FROM wallet w
		JOIN site s ON s.id = w.site_id
		JOIN profile p ON p.id = w.profile_id
		WHERE w.enabled = 1 AND s.enabled = 1 AND p.enabled = 1
		ORDER BY w.id
		"#,
		WALLET_COLUMNS
	))
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().map(Wallet::from).collect())
}

/// Id of the unknown bucket of (site, profile), created on first use.
pub async fn ensure_unknown_bucket(
	pool: &SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
) -> Result<WalletId, DbError> {
	let result = sqlx::query(
		r#"
		INSERT INTO wallet (site_id, profile_id, name, address, addresstype, owned, enabled, haschild)
		VALUES (?, ?, ?, NULL, ?, 0, 0, 1)
		ON CONFLICT DO NOTHING
		"#,
	)
	.bind(site_id)
	.bind(profile_id)
	.bind(UNKNOWN_BUCKET_NAME)
	.bind(AddressType::Unknown.as_str())
	.execute(pool)
	.await?;

	if result.rows_affected() > 0 {
		info!(
			"Created unknown bucket wallet {} for site {} profile {}",
			result.last_insert_rowid(),
			site_id,
			profile_id
		);
	}

	let id = sqlx::query_scalar::<_, i64>(
		"SELECT id FROM wallet WHERE site_id = ? AND profile_id = ? AND addresstype = ?",
	)
	.bind(site_id)
	.bind(profile_id)
	.bind(AddressType::Unknown.as_str())
	.fetch_one(pool)
	.await?;

	Ok(id)
}

pub async fn set_has_children(pool: &SqlitePool, id: WalletId) -> Result<(), DbError> {
	sqlx::query("UPDATE wallet SET haschild = 1 WHERE id = ? AND haschild = 0")
		.bind(id)
		.execute(pool)
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{memory_pool, seed_profile, seed_site};

	fn new_wallet(site_id: SiteId, profile_id: ProfileId, address: &str) -> NewWallet {
		NewWallet {
			site_id,
			profile_id,
			name: "savings".to_string(),
			address: address.to_string(),
			address_type: AddressType::Normal,
			owned: true,
			enabled: true,
		}
	}

	#[tokio::test]
	async fn rejects_duplicate_address_on_same_site() {
		let pool = memory_pool().await;
		let profile = seed_profile(&pool).await;
		let site = seed_site(&pool).await;

		let id = insert_wallet(&pool, &new_wallet(site, profile, "1abc")).await.unwrap();
		let err = insert_wallet(&pool, &new_wallet(site, profile, "1abc"))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Duplicate(_)));

		let wallet = get_wallet(&pool, id).await.unwrap();
		assert_eq!(wallet.address.as_deref(), Some("1abc"));
		assert_eq!(wallet.address_type, AddressType::Normal);
		assert!(wallet.owned && wallet.enabled && !wallet.has_children);
	}

	#[tokio::test]
	async fn lookup_is_scoped_to_profile() {
		let pool = memory_pool().await;
		let alice = seed_profile(&pool).await;
		let bob = crate::db::profile::insert_profile(&pool, "bob").await.unwrap();
		let site = seed_site(&pool).await;

		insert_wallet(&pool, &new_wallet(site, alice, "1abc")).await.unwrap();
		assert!(find_wallet_by_address(&pool, site, alice, "1abc").await.unwrap().is_some());
		assert!(find_wallet_by_address(&pool, site, bob, "1abc").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn unknown_bucket_is_created_once() {
		let pool = memory_pool().await;
		let profile = seed_profile(&pool).await;
		let site = seed_site(&pool).await;

		let first = ensure_unknown_bucket(&pool, site, profile).await.unwrap();
		let second = ensure_unknown_bucket(&pool, site, profile).await.unwrap();
		assert_eq!(first, second);

		let bucket = get_wallet(&pool, first).await.unwrap();
		assert_eq!(bucket.address_type, AddressType::Unknown);
		assert_eq!(bucket.address, None);
		assert!(!bucket.owned && !bucket.enabled && bucket.has_children);

		// never part of a sync pass
		assert!(enabled_wallets(&pool).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn disabled_sites_are_skipped() {
		let pool = memory_pool().await;
		let profile = seed_profile(&pool).await;
		let site = seed_site(&pool).await;
		insert_wallet(&pool, &new_wallet(site, profile, "1abc")).await.unwrap();
		assert_eq!(enabled_wallets(&pool).await.unwrap().len(), 1);

		crate::db::site::set_site_enabled(&pool, site, false).await.unwrap();
		assert!(enabled_wallets(&pool).await.unwrap().is_empty());
	}
}
