//! Fallback Migration
//!
//! Copies records written to the fallback adapter during an outage back into
//! the durable adapter once it is reachable again.

use serde::Serialize;

use crate::prelude::*;

/// Outcome of a migration run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
	/// Records written to the target
	pub records: usize,
	/// Written records carrying an active ban
	pub bans: usize,
	/// Stale records or records the target has seen more recently
	pub skipped: usize,
	pub errors: usize,
}

/// Copy every live record from `from` into `to`
///
/// Expired bans are cleared before import. A failure on one record is logged
/// and counted; only failing to list the source aborts the run.
pub async fn migrate_fallback(
	from: &dyn WindowAdapter,
	to: &dyn WindowAdapter,
	now: Timestamp,
) -> WdResult<MigrationReport> {
	let mut report = MigrationReport::default();

	for mut rec in from.list_records().await? {
		if rec.is_stale(now) {
			report.skipped += 1;
			continue;
		}

		match to.read_record(&rec.address).await {
			Ok(Some(existing)) if existing.last_seen >= rec.last_seen => {
				debug!("Skipping {}, {} record is newer", rec.address, to.name());
				report.skipped += 1;
				continue;
			}
			Ok(_) => {}
			Err(err) => {
				warn!("Migration of {} failed: {}", rec.address, err);
				report.errors += 1;
				continue;
			}
		}

		if rec.is_banned && !rec.is_ban_active(now) {
			rec.clear_ban();
		}

		match to.import_record(&rec).await {
			Ok(()) => {
				report.records += 1;
				if rec.is_banned {
					report.bans += 1;
				}
			}
			Err(err) => {
				warn!("Migration of {} failed: {}", rec.address, err);
				report.errors += 1;
			}
		}
	}

	info!(
		"Migrated {} records ({} bans) from {} to {}, {} skipped, {} errors",
		report.records,
		report.bans,
		from.name(),
		to.name(),
		report.skipped,
		report.errors
	);
	Ok(report)
}

// vim: ts=4
