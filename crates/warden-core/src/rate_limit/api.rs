//! Rate Limiting Internal API
//!
//! Ban administration for moderation tooling. Calls go through the same
//! durable-then-fallback path as admission checks.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::prelude::*;

/// Statistics about the rate limiter
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
	/// Requests admitted
	pub total_admitted: u64,
	/// Requests denied because the window limit was exceeded
	pub total_rate_limited: u64,
	/// Requests denied because of a ban
	pub total_banned: u64,
	/// Calls routed to the fallback adapter
	pub total_fallback_calls: u64,
	/// Calls neither adapter could answer
	pub total_storage_failures: u64,
	/// Whether a durable adapter is configured
	pub durable_configured: bool,
}

#[async_trait]
pub trait RateLimitApi: Send + Sync {
	/// Ban an address. `duration` None bans permanently.
	async fn ban(&self, address: &str, duration: Option<Duration>, reason: &str) -> WdResult<()>;

	/// Lift a ban. Returns false if the address was not banned.
	async fn unban(&self, address: &str) -> WdResult<bool>;

	/// Current record of an address, if it was ever seen
	async fn status(&self, address: &str) -> WdResult<Option<RateRecord>>;

	/// All records with a ban in effect
	async fn list_bans(&self) -> WdResult<Vec<RateRecord>>;

	fn stats(&self) -> RateLimiterStats;
}

// vim: ts=4
