//! SQLite persistence for wallets, derived children, transactions and checkpoints.
//!
//! Data access is a set of free async functions over a `SqlitePool`, grouped per table. The pool
//! holds a single connection and every statement autocommits, so a transaction insert and the
//! checkpoint advance that follows it are two separate commits.

pub mod asset;
pub mod checkpoint;
pub mod profile;
pub mod site;
pub mod transaction;
pub mod wallet;
pub mod walletchild;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),

	#[error("{0} not found")]
	NotFound(String),

	#[error("No wallet found for address {0}")]
	NoWalletFound(String),

	#[error("More than one {entity} matches {key}")]
	Multiple { entity: &'static str, key: String },

	#[error("{0} already exists")]
	Duplicate(String),
}

/// Open the database behind `url` with a single, never recycled connection.
///
/// Keeping the connection alive matters for `sqlite::memory:` databases, which vanish with it.
pub async fn create_pool(url: &str) -> Result<SqlitePool, DbError> {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect(url)
		.await?;
	Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::migrate!("./migrations").run(pool).await?;
	info!("Database migrations applied");
	Ok(())
}

/// Reject a lookup that matched more than one row.
pub(crate) fn at_most_one<T>(
	mut rows: Vec<T>,
	entity: &'static str,
	key: &str,
) -> Result<Option<T>, DbError> {
	match rows.len() {
		0 => Ok(None),
		1 => Ok(rows.pop()),
		_ => Err(DbError::Multiple {
			entity,
			key: key.to_string(),
		}),
	}
}
