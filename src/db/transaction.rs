use super::DbError;
use crate::wallet::{InsertOutcome, NewTransaction};

use sqlx::SqlitePool;

/// Insert a reconciled transaction unless one with the same txid and receiving side exists.
///
/// The dedup key is `(txid, to_wallet_id, to_walletchild_id)` with a missing child compared as
/// equal to another missing child, so reruns and crash recovery never produce a second row.
pub async fn insert_transaction(
	pool: &SqlitePool,
	tx: &NewTransaction,
) -> Result<InsertOutcome, DbError> {
	let result = sqlx::query(
		r#"
		INSERT INTO transactions (
			profile_id,
			site_id,
			transactiontype_id,
			timestamp,
			txid,
			from_wallet_id,
			from_walletchild_id,
			to_wallet_id,
			to_walletchild_id,
			quote_asset_id,
			base_asset_id,
			fee_asset_id,
			quantity,
			fee,
			note
		) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
		ON CONFLICT DO NOTHING
		"#,
	)
	.bind(tx.profile_id)
	.bind(tx.site_id)
	.bind(tx.kind.id())
	.bind(tx.timestamp)
	.bind(&tx.txid)
	.bind(tx.from.wallet_id())
	.bind(tx.from.child_id())
	.bind(tx.to.wallet_id())
	.bind(tx.to.child_id())
	.bind(tx.quote_asset)
	.bind(tx.base_asset)
	.bind(tx.fee_asset)
	.bind(tx.quantity)
	.bind(tx.fee)
	.bind(&tx.note)
	.execute(pool)
	.await?;

	if result.rows_affected() == 0 {
		return Ok(InsertOutcome::Duplicate);
	}
	Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
}

/// Whether a transaction with this dedup key is already stored. `IS` keeps the child comparison
/// null safe.
pub async fn transaction_exists(pool: &SqlitePool, tx: &NewTransaction) -> Result<bool, DbError> {
	let found = sqlx::query_scalar::<_, i64>(
		r#"
		SELECT id FROM transactions
		WHERE txid = ? AND to_wallet_id = ? AND to_walletchild_id IS ?
		"#,
	)
	.bind(&tx.txid)
	.bind(tx.to.wallet_id())
	.bind(tx.to.child_id())
	.fetch_optional(pool)
	.await?;
	Ok(found.is_some())
}
