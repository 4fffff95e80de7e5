use super::DbError;
use crate::wallet::ProfileId;

use sqlx::SqlitePool;

pub async fn insert_profile(pool: &SqlitePool, name: &str) -> Result<ProfileId, DbError> {
	let result = sqlx::query("INSERT INTO profile (name, enabled) VALUES (?, 1)")
		.bind(name)
		.execute(pool)
		.await?;
	Ok(result.last_insert_rowid())
}

pub async fn find_profile_id(pool: &SqlitePool, name: &str) -> Result<Option<ProfileId>, DbError> {
	let id = sqlx::query_scalar::<_, i64>("SELECT id FROM profile WHERE name = ?")
		.bind(name)
		.fetch_optional(pool)
		.await?;
	Ok(id)
}
