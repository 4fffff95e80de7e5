use super::DbError;
use crate::wallet::SiteId;

use sqlx::SqlitePool;

/// Make sure a row exists for a registered site adapter. Existing rows keep their `enabled` flag.
pub async fn ensure_site(pool: &SqlitePool, id: SiteId, name: &str) -> Result<(), DbError> {
	sqlx::query("INSERT INTO site (id, name, enabled) VALUES (?, ?, 1) ON CONFLICT(id) DO NOTHING")
		.bind(id)
		.bind(name)
		.execute(pool)
		.await?;
	Ok(())
}

pub async fn set_site_enabled(pool: &SqlitePool, id: SiteId, enabled: bool) -> Result<(), DbError> {
	let result = sqlx::query("UPDATE site SET enabled = ? WHERE id = ?")
		.bind(enabled)
		.bind(id)
		.execute(pool)
		.await?;
	if result.rows_affected() == 0 {
		return Err(DbError::NotFound(format!("site {}", id)));
	}
	Ok(())
}
