//! Common types used throughout Warden.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now()
			.duration_since(SystemTime::UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or_default();
		Timestamp(i64::try_from(res).unwrap_or(i64::MAX))
	}

	pub fn add_seconds(&self, seconds: u64) -> Timestamp {
		Timestamp(self.0.saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX)))
	}

	/// Seconds elapsed from `earlier` to `self` (negative if `earlier` is in the future)
	pub fn seconds_since(&self, earlier: Timestamp) -> i64 {
		self.0.saturating_sub(earlier.0)
	}

	/// Remaining duration until `self`, zero if already past
	pub fn remaining_from(&self, now: Timestamp) -> Duration {
		Duration::from_secs(u64::try_from(self.0.saturating_sub(now.0)).unwrap_or(0))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Clock //
//*******//
/// Source of the current time for limiter decisions
pub trait Clock: std::fmt::Debug + Send + Sync {
	fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		Timestamp::now()
	}
}


// vim: ts=4
