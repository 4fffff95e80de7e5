use super::{DbError, at_most_one};
use crate::wallet::{BranchType, ChildId, ProfileId, SiteId, TransactionType, WalletChild, WalletId};

use sqlx::SqlitePool;

#[derive(sqlx::FromRow)]
struct ChildRow {
	id: i64,
	parent_id: i64,
	address: String,
	branch: String,
	used: bool,
}

impl From<ChildRow> for WalletChild {
	fn from(row: ChildRow) -> Self {
		WalletChild {
			id: row.id,
			parent_id: row.parent_id,
			address: row.address,
			branch: BranchType::from_db(&row.branch),
			used: row.used,
		}
	}
}

/// Insert a child address. Returns `None` when the address is already known anywhere.
pub async fn insert_walletchild(
	pool: &SqlitePool,
	parent_id: WalletId,
	address: &str,
	branch: BranchType,
	used: bool,
) -> Result<Option<ChildId>, DbError> {
	let result = sqlx::query(
		r#"
		INSERT INTO walletchild (parent_id, address, branch, used)
		VALUES (?, ?, ?, ?)
		ON CONFLICT(address) DO NOTHING
		"#,
	)
	.bind(parent_id)
	.bind(address)
	.bind(branch.as_str())
	.bind(used)
	.execute(pool)
	.await?;

	if result.rows_affected() == 0 {
		return Ok(None);
	}
	Ok(Some(result.last_insert_rowid()))
}

pub async fn count_children(
	pool: &SqlitePool,
	parent_id: WalletId,
	branch: BranchType,
) -> Result<u32, DbError> {
	let count = sqlx::query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM walletchild WHERE parent_id = ? AND branch = ?",
	)
	.bind(parent_id)
	.bind(branch.as_str())
	.fetch_one(pool)
	.await?;
	Ok(count as u32)
}

pub async fn children_of(pool: &SqlitePool, parent_id: WalletId) -> Result<Vec<WalletChild>, DbError> {
	let rows = sqlx::query_as::<_, ChildRow>(
		"SELECT id, parent_id, address, branch, used FROM walletchild WHERE parent_id = ? ORDER BY id",
	)
	.bind(parent_id)
	.fetch_all(pool)
	.await?;
	Ok(rows.into_iter().map(WalletChild::from).collect())
}

/// Child address below any wallet of one (site, profile).
pub async fn find_child_for_profile(
	pool: &SqlitePool,
	site_id: SiteId,
	profile_id: ProfileId,
	address: &str,
) -> Result<Option<WalletChild>, DbError> {
	let rows = sqlx::query_as::<_, ChildRow>(
		r#"
		SELECT c.id, c.parent_id, c.address, c.branch, c.used
		FROM walletchild c
		JOIN wallet w ON w.id = c.parent_id
		WHERE w.site_id = ? AND w.profile_id = ? AND c.address = ?
		"#,
	)
	.bind(site_id)
	.bind(profile_id)
	.bind(address)
	.fetch_all(pool)
	.await?;

	Ok(at_most_one(rows, "wallet child", address)?.map(WalletChild::from))
}

pub async fn find_child_by_address(
	pool: &SqlitePool,
	address: &str,
) -> Result<Option<WalletChild>, DbError> {
	let row = sqlx::query_as::<_, ChildRow>(
		"SELECT id, parent_id, address, branch, used FROM walletchild WHERE address = ?",
	)
	.bind(address)
	.fetch_optional(pool)
	.await?;
	Ok(row.map(WalletChild::from))
}

/// Move a child parked below an unknown bucket to the master wallet that derives it.
///
/// Ledger rows pointing at the child follow it to the new parent. When the new parent is owned,
/// rows whose other side is an owned wallet become internal moves.
pub async fn adopt_child(
	pool: &SqlitePool,
	child_id: ChildId,
	parent_id: WalletId,
	branch: BranchType,
) -> Result<(), DbError> {
	let mut tx = pool.begin().await?;

	sqlx::query("UPDATE walletchild SET parent_id = ?, branch = ?, used = 1 WHERE id = ?")
		.bind(parent_id)
		.bind(branch.as_str())
		.bind(child_id)
		.execute(&mut *tx)
		.await?;
	sqlx::query("UPDATE transactions SET to_wallet_id = ? WHERE to_walletchild_id = ?")
		.bind(parent_id)
		.bind(child_id)
		.execute(&mut *tx)
		.await?;
	sqlx::query("UPDATE transactions SET from_wallet_id = ? WHERE from_walletchild_id = ?")
		.bind(parent_id)
		.bind(child_id)
		.execute(&mut *tx)
		.await?;
	sqlx::query(
		r#"
		UPDATE transactions SET transactiontype_id = ?
		WHERE (SELECT owned FROM wallet WHERE id = ?) = 1
		AND (
			(to_walletchild_id = ? AND from_wallet_id IN (SELECT id FROM wallet WHERE owned = 1))
			OR (from_walletchild_id = ? AND to_wallet_id IN (SELECT id FROM wallet WHERE owned = 1))
		)
		"#,
	)
	.bind(TransactionType::MoveInternal.id())
	.bind(parent_id)
	.bind(child_id)
	.bind(child_id)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{
		memory_pool, seed_asset, seed_master_wallet, seed_profile, seed_site, seed_wallet,
	};
	use crate::wallet::{AddressType, NewTransaction, WalletRef};

	#[tokio::test]
	async fn child_addresses_are_globally_unique() {
		let pool = memory_pool().await;
		let profile = seed_profile(&pool).await;
		let site = seed_site(&pool).await;
		let parent = seed_master_wallet(&pool, site, profile, "xpub-parent").await;

		let first = insert_walletchild(&pool, parent, "1child", BranchType::Receiving, true)
			.await
			.unwrap();
		assert!(first.is_some());
		let again = insert_walletchild(&pool, parent, "1child", BranchType::Change, true)
			.await
			.unwrap();
		assert_eq!(again, None);

		assert_eq!(count_children(&pool, parent, BranchType::Receiving).await.unwrap(), 1);
		assert_eq!(count_children(&pool, parent, BranchType::Change).await.unwrap(), 0);

		let child = find_child_by_address(&pool, "1child").await.unwrap().unwrap();
		assert_eq!(Some(child.id), first);
		assert_eq!(child.branch, BranchType::Receiving);
		assert!(child.used);
		assert_eq!(children_of(&pool, parent).await.unwrap(), vec![child]);
	}

	#[tokio::test]
	async fn adopted_child_moves_with_its_transactions() {
		let pool = memory_pool().await;
		let profile = seed_profile(&pool).await;
		let site = seed_site(&pool).await;
		let asset = seed_asset(&pool).await;
		let sender = seed_wallet(&pool, site, profile, "1sender", AddressType::Normal, true).await;
		let master = seed_master_wallet(&pool, site, profile, "xpub-parent").await;
		let bucket = crate::db::wallet::ensure_unknown_bucket(&pool, site, profile)
			.await
			.unwrap();
		let child = insert_walletchild(&pool, bucket, "1parked", BranchType::Undifferentiated, true)
			.await
			.unwrap()
			.unwrap();
		crate::db::transaction::insert_transaction(
			&pool,
			&NewTransaction {
				profile_id: profile,
				site_id: site,
				kind: TransactionType::MoveWithdrawal,
				timestamp: 100,
				txid: "gift".to_string(),
				from: WalletRef::Wallet(sender),
				to: WalletRef::Child {
					wallet: bucket,
					child,
				},
				quote_asset: asset,
				base_asset: None,
				fee_asset: asset,
				quantity: 5_000,
				fee: 100,
				note: String::new(),
			},
		)
		.await
		.unwrap();

		adopt_child(&pool, child, master, BranchType::Receiving).await.unwrap();

		let adopted = find_child_by_address(&pool, "1parked").await.unwrap().unwrap();
		assert_eq!(adopted.parent_id, master);
		assert_eq!(adopted.branch, BranchType::Receiving);
		assert!(children_of(&pool, bucket).await.unwrap().is_empty());

		let (to_wallet, kind): (i64, i64) = sqlx::query_as(
			"SELECT to_wallet_id, transactiontype_id FROM transactions WHERE txid = 'gift'",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert_eq!(to_wallet, master);
		assert_eq!(kind, TransactionType::MoveInternal.id());
	}

	#[tokio::test]
	async fn profile_scoped_child_lookup() {
		let pool = memory_pool().await;
		let alice = seed_profile(&pool).await;
		let bob = crate::db::profile::insert_profile(&pool, "bob").await.unwrap();
		let site = seed_site(&pool).await;
		let parent = seed_master_wallet(&pool, site, alice, "xpub-parent").await;
		insert_walletchild(&pool, parent, "1child", BranchType::Receiving, true)
			.await
			.unwrap();

		assert!(find_child_for_profile(&pool, site, alice, "1child").await.unwrap().is_some());
		assert!(find_child_for_profile(&pool, site, bob, "1child").await.unwrap().is_none());
	}
}
