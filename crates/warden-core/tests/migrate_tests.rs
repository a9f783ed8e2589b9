//! Fallback to durable migration tests

use tempfile::TempDir;
use warden_core::prelude::*;
use warden_core::rate_limit::{migrate_fallback, MigrationReport};
use warden_window_adapter_fs::WindowAdapterFs;
use warden_window_adapter_sqlite::WindowAdapterSqlite;

async fn create_test_adapters() -> (WindowAdapterFs, WindowAdapterSqlite, TempDir) {
	let temp = TempDir::new().expect("Failed to create temp directory");
	let fallback = WindowAdapterFs::new(temp.path().join("rate_limits.json"))
		.await
		.expect("Failed to create fallback adapter");
	let durable = WindowAdapterSqlite::new(temp.path().join("db"))
		.await
		.expect("Failed to create durable adapter");
	(fallback, durable, temp)
}

fn record(address: &str, last_seen: i64) -> RateRecord {
	let mut rec = RateRecord::new(address, Timestamp(last_seen));
	rec.request_count = 2;
	rec
}

#[tokio::test]
async fn test_migrate_live_records_and_bans() {
	let (fallback, durable, _temp) = create_test_adapters().await;
	let now = Timestamp(1000);

	fallback.import_record(&record("10.0.0.1", 990)).await.expect("Import failed");

	let mut banned = record("10.0.0.2", 100);
	banned.apply_ban(Some(Timestamp(2000)), "spam");
	fallback.import_record(&banned).await.expect("Import failed");

	let mut permanent = record("10.0.0.3", 100);
	permanent.apply_ban(None, "abuse");
	fallback.import_record(&permanent).await.expect("Import failed");

	let report = migrate_fallback(&fallback, &durable, now)
		.await
		.expect("Migration failed");
	assert_eq!(report, MigrationReport { records: 3, bans: 2, skipped: 0, errors: 0 });

	let rec = durable.read_record("10.0.0.2").await.expect("Read failed").expect("Missing");
	assert_eq!(rec.ban_expiry, Some(Timestamp(2000)));
	assert_eq!(rec.ban_reason.as_deref(), Some("spam"));
	assert_eq!(
		durable.check_and_admit("10.0.0.3", &WindowPolicy::default(), now).await.expect("Admit failed"),
		Decision::banned(None, Some("abuse"))
	);
}

#[tokio::test]
async fn test_migrate_skips_stale_and_newer() {
	let (fallback, durable, _temp) = create_test_adapters().await;
	let now = Timestamp(1000);

	// Window long expired, nothing to carry over
	fallback.import_record(&record("10.0.0.1", 100)).await.expect("Import failed");

	// Durable side has seen this address after the outage
	fallback.import_record(&record("10.0.0.2", 980)).await.expect("Import failed");
	durable.import_record(&record("10.0.0.2", 995)).await.expect("Import failed");

	let report = migrate_fallback(&fallback, &durable, now)
		.await
		.expect("Migration failed");
	assert_eq!(report, MigrationReport { records: 0, bans: 0, skipped: 2, errors: 0 });

	assert!(durable.read_record("10.0.0.1").await.expect("Read failed").is_none());
	let rec = durable.read_record("10.0.0.2").await.expect("Read failed");
	assert_eq!(rec.map(|r| r.last_seen), Some(Timestamp(995)));
}

#[tokio::test]
async fn test_migrate_counts_target_errors() {
	let (fallback, durable, _temp) = create_test_adapters().await;
	fallback.import_record(&record("10.0.0.1", 990)).await.expect("Import failed");
	durable.close().await;

	let report = migrate_fallback(&fallback, &durable, Timestamp(1000))
		.await
		.expect("Migration failed");
	assert_eq!(report.errors, 1);
	assert_eq!(report.records, 0);
}

// vim: ts=4
