use super::DbError;
use crate::wallet::{Timestamp, WalletId};

use sqlx::SqlitePool;

/// Exclusive lower bound for the next fetch of a wallet. Zero when the wallet was never synced.
pub async fn get_checkpoint(pool: &SqlitePool, wallet_id: WalletId) -> Result<Timestamp, DbError> {
	let ts = sqlx::query_scalar::<_, i64>("SELECT timestamp FROM scrape_checkpoint WHERE wallet_id = ?")
		.bind(wallet_id)
		.fetch_optional(pool)
		.await?;
	Ok(ts.unwrap_or(0))
}

/// Move the checkpoint forward to `timestamp`. A lower value leaves the stored one untouched.
///
/// Returns the checkpoint in effect after the update.
pub async fn advance_checkpoint(
	pool: &SqlitePool,
	wallet_id: WalletId,
	timestamp: Timestamp,
) -> Result<Timestamp, DbError> {
	let stored = sqlx::query_scalar::<_, i64>(
		r#"
		INSERT INTO scrape_checkpoint (wallet_id, timestamp)
		VALUES (?, ?)
		ON CONFLICT(wallet_id) DO UPDATE
		SET timestamp = MAX(scrape_checkpoint.timestamp, excluded.timestamp)
		RETURNING timestamp
		"#,
	)
	.bind(wallet_id)
	.bind(timestamp)
	.fetch_one(pool)
	.await?;
	Ok(stored)
}
