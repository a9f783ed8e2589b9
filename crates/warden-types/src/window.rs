//! Fixed-window counting and ban escalation.
//!
//! The decision table lives here as a pure function so that the durable and
//! the fallback window adapters apply exactly the same rules. Adapters are
//! responsible for loading the record and persisting the returned one
//! atomically (or, for the fallback store, on a best-effort basis).
//!
//! A window keeps the length it was opened with. Routes with different
//! policies may count the same address, and expiry (hence garbage
//! collection in the fallback store) depends only on the record itself.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::prelude::*;

pub const DEFAULT_LIMIT: u32 = 3;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_ESCALATION_FACTOR: u32 = 3;
pub const DEFAULT_BAN_DURATION_SECS: u64 = 3600;
pub const DEFAULT_BAN_REASON: &str = "Rate limit exceeded";

/// Rate tracking record, one per source address
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRecord {
	pub address: Box<str>,
	pub request_count: u32,
	pub window_start: Timestamp,
	/// Length of the window opened at `window_start`
	#[serde(default = "default_window_secs")]
	pub window_secs: u64,
	/// Informational only, not used for window math
	pub last_seen: Timestamp,
	#[serde(default)]
	pub is_banned: bool,
	/// None with `is_banned` set means a permanent ban
	pub ban_expiry: Option<Timestamp>,
	pub ban_reason: Option<Box<str>>,
}

fn default_window_secs() -> u64 {
	DEFAULT_WINDOW_SECS
}

impl RateRecord {
	/// Record for a first-seen address
	pub fn new(address: &str, now: Timestamp) -> Self {
		Self {
			address: address.into(),
			request_count: 1,
			window_start: now,
			window_secs: DEFAULT_WINDOW_SECS,
			last_seen: now,
			is_banned: false,
			ban_expiry: None,
			ban_reason: None,
		}
	}

	pub fn is_ban_active(&self, now: Timestamp) -> bool {
		self.is_banned && self.ban_expiry.is_none_or(|exp| exp > now)
	}

	pub fn is_window_expired(&self, now: Timestamp) -> bool {
		now.seconds_since(self.window_start) > i64::try_from(self.window_secs).unwrap_or(i64::MAX)
	}

	/// Neither the counting window nor a ban keeps this record relevant
	pub fn is_stale(&self, now: Timestamp) -> bool {
		self.is_window_expired(now) && !self.is_ban_active(now)
	}

	/// Copy with a lapsed ban cleared, as the next admission would see it
	pub fn current(mut self, now: Timestamp) -> Self {
		if self.is_banned && !self.is_ban_active(now) {
			self.clear_ban();
		}
		self
	}

	fn open_window(&mut self, window_secs: u64, now: Timestamp) {
		self.request_count = 1;
		self.window_start = now;
		self.window_secs = window_secs;
		self.last_seen = now;
	}

	pub fn apply_ban(&mut self, expiry: Option<Timestamp>, reason: &str) {
		self.is_banned = true;
		self.ban_expiry = expiry;
		self.ban_reason = Some(reason.into());
	}

	pub fn clear_ban(&mut self) {
		self.is_banned = false;
		self.ban_expiry = None;
		self.ban_reason = None;
	}
}

/// Counting and escalation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPolicy {
	limit: u32,
	window_secs: u64,
	escalation_factor: u32,
	ban_duration_secs: u64,
	ban_reason: Box<str>,
}

impl WindowPolicy {
	/// Create a policy with the default escalation settings
	pub fn new(limit: u32, window_secs: u64) -> WdResult<Self> {
		Self::with_escalation(
			limit,
			window_secs,
			DEFAULT_ESCALATION_FACTOR,
			DEFAULT_BAN_DURATION_SECS,
		)
	}

	pub fn with_escalation(
		limit: u32,
		window_secs: u64,
		escalation_factor: u32,
		ban_duration_secs: u64,
	) -> WdResult<Self> {
		if limit == 0 {
			return Err(Error::ConfigurationInvalid("limit must be positive".into()));
		}
		if window_secs == 0 {
			return Err(Error::ConfigurationInvalid("window length must be positive".into()));
		}
		if escalation_factor == 0 {
			return Err(Error::ConfigurationInvalid("escalation factor must be positive".into()));
		}
		if ban_duration_secs == 0 {
			return Err(Error::ConfigurationInvalid("ban duration must be positive".into()));
		}
		// Request counts are u32 and must be able to exceed the threshold
		if u64::from(limit) * u64::from(escalation_factor) >= u64::from(u32::MAX) {
			return Err(Error::ConfigurationInvalid(
				"limit times escalation factor must stay below 2^32 - 1".into(),
			));
		}
		Ok(Self {
			limit,
			window_secs,
			escalation_factor,
			ban_duration_secs,
			ban_reason: DEFAULT_BAN_REASON.into(),
		})
	}

	pub fn ban_reason(mut self, reason: impl Into<Box<str>>) -> Self {
		self.ban_reason = reason.into();
		self
	}

	pub fn limit(&self) -> u32 {
		self.limit
	}
	pub fn window_secs(&self) -> u64 {
		self.window_secs
	}
	pub fn escalation_factor(&self) -> u32 {
		self.escalation_factor
	}
	pub fn ban_duration_secs(&self) -> u64 {
		self.ban_duration_secs
	}
	pub fn reason(&self) -> &str {
		&self.ban_reason
	}

	/// Count above which a ban is written instead of a plain denial
	pub fn ban_threshold(&self) -> u64 {
		u64::from(self.limit) * u64::from(self.escalation_factor)
	}
}

impl Default for WindowPolicy {
	fn default() -> Self {
		Self {
			limit: DEFAULT_LIMIT,
			window_secs: DEFAULT_WINDOW_SECS,
			escalation_factor: DEFAULT_ESCALATION_FACTOR,
			ban_duration_secs: DEFAULT_BAN_DURATION_SECS,
			ban_reason: DEFAULT_BAN_REASON.into(),
		}
	}
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
	RateLimited,
	Banned,
}

impl DenyReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			DenyReason::RateLimited => "rate_limited",
			DenyReason::Banned => "banned",
		}
	}
}

impl std::fmt::Display for DenyReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Denial {
	pub reason: DenyReason,
	pub retry_after_secs: Option<u64>,
	/// Human readable ban reason
	pub message: Option<Box<str>>,
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	Allowed,
	Denied(Denial),
}

impl Decision {
	pub fn rate_limited(retry_after_secs: u64) -> Self {
		Decision::Denied(Denial {
			reason: DenyReason::RateLimited,
			retry_after_secs: Some(retry_after_secs),
			message: None,
		})
	}

	pub fn banned(retry_after_secs: Option<u64>, message: Option<&str>) -> Self {
		Decision::Denied(Denial {
			reason: DenyReason::Banned,
			retry_after_secs,
			message: message.map(Into::into),
		})
	}

	pub fn is_allowed(&self) -> bool {
		matches!(self, Decision::Allowed)
	}

	pub fn deny_reason(&self) -> Option<DenyReason> {
		match self {
			Decision::Allowed => None,
			Decision::Denied(denial) => Some(denial.reason),
		}
	}
}

/// Apply one request to the stored record of an address.
///
/// Returns the record to persist and the decision for the request. An
/// expired ban is cleared before anything else is decided; an active ban
/// denies the request without touching the counting window.
pub fn evaluate(
	existing: Option<RateRecord>,
	address: &str,
	policy: &WindowPolicy,
	now: Timestamp,
) -> (RateRecord, Decision) {
	let Some(mut rec) = existing else {
		let mut rec = RateRecord::new(address, now);
		rec.window_secs = policy.window_secs;
		return (rec, Decision::Allowed);
	};

	if rec.is_banned {
		match rec.ban_expiry {
			None => {
				let decision = Decision::banned(None, rec.ban_reason.as_deref());
				return (rec, decision);
			}
			Some(expiry) if expiry > now => {
				let decision = Decision::banned(
					Some(expiry.remaining_from(now).as_secs()),
					rec.ban_reason.as_deref(),
				);
				return (rec, decision);
			}
			Some(_) => rec.clear_ban(),
		}
	}

	if rec.is_window_expired(now) {
		rec.open_window(policy.window_secs, now);
		return (rec, Decision::Allowed);
	}

	rec.request_count = rec.request_count.saturating_add(1);
	rec.last_seen = now;

	if rec.request_count <= policy.limit {
		return (rec, Decision::Allowed);
	}

	if u64::from(rec.request_count) > policy.ban_threshold() {
		let expiry = now.add_seconds(policy.ban_duration_secs);
		rec.apply_ban(Some(expiry), &policy.ban_reason);
		let decision = Decision::banned(None, Some(&policy.ban_reason));
		return (rec, decision);
	}

	let elapsed = u64::try_from(now.seconds_since(rec.window_start)).unwrap_or(0);
	let retry_after = rec.window_secs.saturating_sub(elapsed).clamp(1, rec.window_secs);
	(rec, Decision::rate_limited(retry_after))
}


// vim: ts=4
