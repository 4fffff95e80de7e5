use super::DbError;
use crate::wallet::AssetId;

use sqlx::SqlitePool;

/// Register an asset, returning the id of the existing row when the symbol is already known.
pub async fn insert_asset(
	pool: &SqlitePool,
	name: &str,
	symbol: &str,
	decimal_places: u8,
) -> Result<AssetId, DbError> {
	sqlx::query(
		r#"
		INSERT INTO asset (name, symbol, decimal_places)
		VALUES (?, ?, ?)
		ON CONFLICT(symbol) DO NOTHING
		"#,
	)
	.bind(name)
	.bind(symbol)
	.bind(decimal_places)
	.execute(pool)
	.await?;

	find_asset_id(pool, symbol)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("asset {}", symbol)))
}

pub async fn find_asset_id(pool: &SqlitePool, symbol: &str) -> Result<Option<AssetId>, DbError> {
	let id = sqlx::query_scalar::<_, i64>("SELECT id FROM asset WHERE symbol = ?")
		.bind(symbol)
		.fetch_optional(pool)
		.await?;
	Ok(id)
}
