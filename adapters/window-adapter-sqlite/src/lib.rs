//! SQLite-backed durable window adapter.
//!
//! Every admission check is one transaction: the record is locked, evaluated
//! and written back, or nothing is written at all.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};

use warden_types::{
	prelude::*,
	window::{Decision, RateRecord, WindowPolicy},
	window_adapter,
};

mod record;
mod schema;
mod utils;

use utils::inspect;

/// How long a transaction waits for the write lock held by a concurrent admit
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct WindowAdapterSqlite {
	db: SqlitePool,
}

impl WindowAdapterSqlite {
	/// Open (or create) the rate limit database in `path` directory
	pub async fn new(path: impl AsRef<Path>) -> WdResult<Self> {
		tokio::fs::create_dir_all(path.as_ref()).await?;
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(path.as_ref().join("rate_limit.db"))
			.create_if_missing(true)
			.busy_timeout(BUSY_TIMEOUT)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.acquire_timeout(BUSY_TIMEOUT)
			.connect_with(opts)
			.await
			.inspect_err(inspect)
			.map_err(|err| Error::StorageUnavailable(err.to_string()))?;

		schema::init_db(&db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		info!("SQLite window adapter opened at {}", path.as_ref().display());
		Ok(Self { db })
	}

	/// Close the connection pool. Further calls fail with a storage error.
	pub async fn close(&self) {
		self.db.close().await;
	}
}

#[async_trait]
impl window_adapter::WindowAdapter for WindowAdapterSqlite {
	fn name(&self) -> &'static str {
		"sqlite"
	}

	async fn check_and_admit(
		&self,
		address: &str,
		policy: &WindowPolicy,
		now: Timestamp,
	) -> WdResult<Decision> {
		record::check_and_admit(&self.db, address, policy, now).await
	}

	async fn ban(
		&self,
		address: &str,
		expiry: Option<Timestamp>,
		reason: &str,
		now: Timestamp,
	) -> WdResult<()> {
		record::ban(&self.db, address, expiry, reason, now).await
	}

	async fn unban(&self, address: &str) -> WdResult<bool> {
		record::unban(&self.db, address).await
	}

	async fn read_record(&self, address: &str) -> WdResult<Option<RateRecord>> {
		record::read(&self.db, address).await
	}

	async fn list_records(&self) -> WdResult<Vec<RateRecord>> {
		record::list(&self.db).await
	}

	async fn import_record(&self, record: &RateRecord) -> WdResult<()> {
		record::import(&self.db, record).await
	}
}

// vim: ts=4
