//! Rate record storage and the transactional admission check

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::utils::*;
use warden_types::{
	prelude::*,
	window::{self, Decision, RateRecord, WindowPolicy, DEFAULT_WINDOW_SECS},
};

const SELECT_RECORD: &str = "SELECT address, request_count, window_start, window_secs, last_seen,
	is_banned, ban_expiry, ban_reason
	FROM rate_limits WHERE address = ?1";

fn db_secs(secs: u64) -> i64 {
	i64::try_from(secs).unwrap_or(i64::MAX)
}

fn row_to_record(row: &SqliteRow) -> Result<RateRecord, sqlx::Error> {
	let address: String = row.try_get("address")?;
	let request_count: i64 = row.try_get("request_count")?;
	let ban_reason: Option<String> = row.try_get("ban_reason")?;
	Ok(RateRecord {
		address: address.into(),
		request_count: u32::try_from(request_count).unwrap_or(u32::MAX),
		window_start: Timestamp(row.try_get("window_start")?),
		window_secs: u64::try_from(row.try_get::<i64, _>("window_secs")?).unwrap_or(0),
		last_seen: Timestamp(row.try_get("last_seen")?),
		is_banned: row.try_get("is_banned")?,
		ban_expiry: row.try_get::<Option<i64>, _>("ban_expiry")?.map(Timestamp),
		ban_reason: ban_reason.map(Into::into),
	})
}

/// Run one request through the decision table inside a single transaction.
///
/// The leading upsert is a write, so SQLite grants this transaction the
/// database write lock before the record is read. Concurrent admits wait on
/// the busy timeout instead of reading a count another transaction is about
/// to change. A freshly inserted placeholder (count 0, window starting now)
/// evaluates exactly like a missing record.
pub(crate) async fn check_and_admit(
	db: &SqlitePool,
	address: &str,
	policy: &WindowPolicy,
	now: Timestamp,
) -> WdResult<Decision> {
	let mut tx = db.begin().await.map_err(db_err)?;

	sqlx::query(
		"INSERT INTO rate_limits (address, request_count, window_start, window_secs, last_seen)
		VALUES (?1, 0, ?2, ?3, ?2)
		ON CONFLICT(address) DO NOTHING",
	)
	.bind(address)
	.bind(now.0)
	.bind(db_secs(policy.window_secs()))
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	let res = sqlx::query(SELECT_RECORD)
		.bind(address)
		.fetch_optional(&mut *tx)
		.await;
	let existing = map_opt(res, row_to_record)?;

	let (record, decision) = window::evaluate(existing, address, policy, now);

	sqlx::query(
		"UPDATE rate_limits
		SET request_count = ?2, window_start = ?3, window_secs = ?8, last_seen = ?4,
			is_banned = ?5, ban_expiry = ?6, ban_reason = ?7, updated_at = unixepoch()
		WHERE address = ?1",
	)
	.bind(address)
	.bind(i64::from(record.request_count))
	.bind(record.window_start.0)
	.bind(record.last_seen.0)
	.bind(record.is_banned)
	.bind(record.ban_expiry.map(|t| t.0))
	.bind(record.ban_reason.as_deref())
	.bind(db_secs(record.window_secs))
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	// Dropping the transaction on any error above rolls it back
	tx.commit().await.map_err(db_err)?;

	if record.is_banned && !decision.is_allowed() {
		debug!("[{}] banned until {:?}", address, record.ban_expiry);
	}
	Ok(decision)
}

pub(crate) async fn ban(
	db: &SqlitePool,
	address: &str,
	expiry: Option<Timestamp>,
	reason: &str,
	now: Timestamp,
) -> WdResult<()> {
	sqlx::query(
		"INSERT INTO rate_limits
			(address, request_count, window_start, window_secs, last_seen,
			is_banned, ban_expiry, ban_reason)
		VALUES (?1, 0, ?2, ?5, ?2, 1, ?3, ?4)
		ON CONFLICT(address) DO UPDATE SET
			is_banned = 1, ban_expiry = excluded.ban_expiry, ban_reason = excluded.ban_reason,
			updated_at = unixepoch()",
	)
	.bind(address)
	.bind(now.0)
	.bind(expiry.map(|t| t.0))
	.bind(reason)
	.bind(db_secs(DEFAULT_WINDOW_SECS))
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn unban(db: &SqlitePool, address: &str) -> WdResult<bool> {
	let res = sqlx::query(
		"UPDATE rate_limits
		SET is_banned = 0, ban_expiry = NULL, ban_reason = NULL, updated_at = unixepoch()
		WHERE address = ?1 AND is_banned = 1",
	)
	.bind(address)
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(res.rows_affected() > 0)
}

pub(crate) async fn read(db: &SqlitePool, address: &str) -> WdResult<Option<RateRecord>> {
	let res = sqlx::query(SELECT_RECORD)
		.bind(address)
		.fetch_optional(db)
		.await;
	map_opt(res, row_to_record)
}

pub(crate) async fn list(db: &SqlitePool) -> WdResult<Vec<RateRecord>> {
	let rows = sqlx::query(
		"SELECT address, request_count, window_start, window_secs, last_seen,
			is_banned, ban_expiry, ban_reason
		FROM rate_limits ORDER BY address",
	)
		.fetch_all(db)
		.await
		.map_err(db_err)?;
	collect_res(rows.iter().map(row_to_record))
}

pub(crate) async fn import(db: &SqlitePool, record: &RateRecord) -> WdResult<()> {
	sqlx::query(
		"INSERT INTO rate_limits
			(address, request_count, window_start, last_seen, is_banned, ban_expiry, ban_reason,
			window_secs)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
		ON CONFLICT(address) DO UPDATE SET
			request_count = excluded.request_count, window_start = excluded.window_start,
			window_secs = excluded.window_secs,
			last_seen = excluded.last_seen, is_banned = excluded.is_banned,
			ban_expiry = excluded.ban_expiry, ban_reason = excluded.ban_reason,
			updated_at = unixepoch()",
	)
	.bind(record.address.as_ref())
	.bind(i64::from(record.request_count))
	.bind(record.window_start.0)
	.bind(record.last_seen.0)
	.bind(record.is_banned)
	.bind(record.ban_expiry.map(|t| t.0))
	.bind(record.ban_reason.as_deref())
	.bind(db_secs(record.window_secs))
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

// vim: ts=4
