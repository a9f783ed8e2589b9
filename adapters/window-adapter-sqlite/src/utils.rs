//! Utility functions for database operations

use sqlx::sqlite::SqliteRow;

use warden_types::prelude::*;

/// Log database errors
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Map a sqlx error to a storage error, distinguishing an unreachable
/// database from a failed statement
pub(crate) fn db_err(err: sqlx::Error) -> Error {
	inspect(&err);
	match err {
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
			Error::StorageUnavailable(err.to_string())
		}
		_ => Error::DbError,
	}
}

/// Map an optional query result to a value using a closure
pub(crate) fn map_opt<T, F>(row: Result<Option<SqliteRow>, sqlx::Error>, f: F) -> WdResult<Option<T>>
where
	F: FnOnce(&SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(Some(ref row)) => f(row).map(Some).map_err(db_err),
		Ok(None) => Ok(None),
		Err(err) => Err(db_err(err)),
	}
}

/// Collect result iterator into a vector
pub(crate) fn collect_res<T>(
	iter: impl Iterator<Item = Result<T, sqlx::Error>> + Unpin,
) -> WdResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.map_err(db_err)?);
	}
	Ok(items)
}

// vim: ts=4
