//! Adapter that stores the per-address rate tracking records.
//!
//! One record per address holds both the counting window and the ban state.
//! Implementations differ in their consistency guarantees: a durable adapter
//! must run [`WindowAdapter::check_and_admit`] as one serializable unit per
//! address, a fallback adapter may only serialize calls within its process.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
	prelude::*,
	window::{Decision, RateRecord, WindowPolicy},
};

#[async_trait]
pub trait WindowAdapter: Debug + Send + Sync {
	/// Short backend name for logs
	fn name(&self) -> &'static str;

	/// Apply one request from `address` and persist the resulting record.
	///
	/// Any failure must leave the stored record unchanged.
	async fn check_and_admit(
		&self,
		address: &str,
		policy: &WindowPolicy,
		now: Timestamp,
	) -> WdResult<Decision>;

	/// Ban an address, creating its record if it was never seen.
	/// `expiry` None means a permanent ban.
	async fn ban(
		&self,
		address: &str,
		expiry: Option<Timestamp>,
		reason: &str,
		now: Timestamp,
	) -> WdResult<()>;

	/// Lift a ban. Returns false if the address had no active ban.
	async fn unban(&self, address: &str) -> WdResult<bool>;

	/// Read the stored record without modifying it
	async fn read_record(&self, address: &str) -> WdResult<Option<RateRecord>>;

	async fn list_records(&self) -> WdResult<Vec<RateRecord>>;

	/// Insert or replace a record as-is (used when migrating between backends)
	async fn import_record(&self, record: &RateRecord) -> WdResult<()>;
}

// vim: ts=4
