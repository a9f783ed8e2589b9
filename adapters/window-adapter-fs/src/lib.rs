//! Fallback window adapter storing every rate record in one JSON file.
//!
//! Each call reads the whole file, mutates it and writes it back. A mutex
//! serializes calls inside one process; separate processes sharing the file
//! can still lose each other's updates. That gap is accepted in exchange for
//! needing nothing but a writable path.

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
	fs::{create_dir_all, read, rename, write},
	sync::Mutex,
};

use warden_types::{
	prelude::*,
	window::{self, Decision, RateRecord, WindowPolicy},
	window_adapter,
};

type RecordMap = BTreeMap<Box<str>, RateRecord>;

fn tmp_file_path(path: &Path) -> PathBuf {
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	PathBuf::from(tmp)
}

#[derive(Debug)]
pub struct WindowAdapterFs {
	path: Box<Path>,
	lock: Mutex<()>,
}

impl WindowAdapterFs {
	pub async fn new(path: impl Into<Box<Path>>) -> WdResult<Self> {
		let path = path.into();
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			create_dir_all(parent).await?;
		}
		Ok(Self { path, lock: Mutex::new(()) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Read all records. A missing file is an empty collection, an unreadable
	/// document is discarded with a warning.
	async fn load(&self) -> WdResult<RecordMap> {
		let data = match read(&self.path).await {
			Ok(data) => data,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(RecordMap::new()),
			Err(err) => return Err(err.into()),
		};
		if data.iter().all(u8::is_ascii_whitespace) {
			return Ok(RecordMap::new());
		}
		match serde_json::from_slice(&data) {
			Ok(records) => Ok(records),
			Err(err) => {
				warn!("Discarding corrupt rate limit file {}: {}", self.path.display(), err);
				Ok(RecordMap::new())
			}
		}
	}

	/// Write all records through a temp file so readers never see a partial document
	async fn store(&self, records: &RecordMap) -> WdResult<()> {
		let data = serde_json::to_vec(records)?;
		let tmp_path = tmp_file_path(&self.path);
		write(&tmp_path, data).await?;
		rename(&tmp_path, &self.path).await?;
		Ok(())
	}
}

#[async_trait]
impl window_adapter::WindowAdapter for WindowAdapterFs {
	fn name(&self) -> &'static str {
		"fs"
	}

	async fn check_and_admit(
		&self,
		address: &str,
		policy: &WindowPolicy,
		now: Timestamp,
	) -> WdResult<Decision> {
		let _guard = self.lock.lock().await;
		let mut records = self.load().await?;

		let before = records.len();
		records.retain(|_, rec| !rec.is_stale(now));
		if records.len() < before {
			debug!("Dropped {} stale rate records", before - records.len());
		}

		let existing = records.remove(address);
		let (record, decision) = window::evaluate(existing, address, policy, now);
		records.insert(address.into(), record);

		self.store(&records).await?;
		Ok(decision)
	}

	async fn ban(
		&self,
		address: &str,
		expiry: Option<Timestamp>,
		reason: &str,
		now: Timestamp,
	) -> WdResult<()> {
		let _guard = self.lock.lock().await;
		let mut records = self.load().await?;

		let rec = records.entry(address.into()).or_insert_with(|| RateRecord {
			request_count: 0,
			..RateRecord::new(address, now)
		});
		rec.apply_ban(expiry, reason);

		self.store(&records).await
	}

	async fn unban(&self, address: &str) -> WdResult<bool> {
		let _guard = self.lock.lock().await;
		let mut records = self.load().await?;

		let Some(rec) = records.get_mut(address).filter(|rec| rec.is_banned) else {
			return Ok(false);
		};
		rec.clear_ban();

		self.store(&records).await?;
		Ok(true)
	}

	async fn read_record(&self, address: &str) -> WdResult<Option<RateRecord>> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.remove(address))
	}

	async fn list_records(&self) -> WdResult<Vec<RateRecord>> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.into_values().collect())
	}

	async fn import_record(&self, record: &RateRecord) -> WdResult<()> {
		let _guard = self.lock.lock().await;
		let mut records = self.load().await?;
		records.insert(record.address.clone(), record.clone());
		self.store(&records).await
	}
}

#[cfg(test)]
mod test {
	use std::path::{Path, PathBuf};

	use crate::tmp_file_path;

	#[test]
	fn test_tmp_file_path() {
		let tmp = tmp_file_path(Path::new("some_dir/rate_limits.json"));
		assert_eq!(tmp, PathBuf::from("some_dir/rate_limits.json.tmp"));
	}
}

// vim: ts=4
