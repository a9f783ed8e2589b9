//! Rate Limiting Configuration

use std::net::IpAddr;
use std::str::FromStr;

use crate::prelude::*;

/// What to decide when neither window adapter can be reached
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailureMode {
	/// Admit the request
	#[default]
	Open,
	/// Deny the request as rate limited for one window
	Closed,
}

impl FromStr for FailureMode {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"open" => Ok(FailureMode::Open),
			"closed" => Ok(FailureMode::Closed),
			_ => Err(Error::ConfigurationInvalid(format!("unknown failure mode: {}", s))),
		}
	}
}

/// Main rate limit configuration
#[derive(Clone, Debug, Default)]
pub struct RateLimitConfig {
	/// Policy applied by `admit` (limit 3 per 60 s, ban after 3x for an hour)
	pub policy: WindowPolicy,
	/// Proxy addresses whose forwarding headers are honoured.
	/// Empty means forwarding headers are trusted from any peer.
	pub trusted_proxies: Box<[IpAddr]>,
	pub failure_mode: FailureMode,
}

impl RateLimitConfig {
	pub fn new(
		limit: u32,
		window_secs: u64,
		escalation_factor: u32,
		ban_duration_secs: u64,
	) -> WdResult<Self> {
		Ok(Self {
			policy: WindowPolicy::with_escalation(
				limit,
				window_secs,
				escalation_factor,
				ban_duration_secs,
			)?,
			..Self::default()
		})
	}

	/// Parse a comma-separated list of proxy addresses
	pub fn trusted_proxies_from_str(mut self, list: &str) -> WdResult<Self> {
		self.trusted_proxies = list
			.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(|s| {
				s.parse::<IpAddr>().map_err(|_| {
					Error::ConfigurationInvalid(format!("invalid trusted proxy address: {}", s))
				})
			})
			.collect::<WdResult<Vec<_>>>()?
			.into_boxed_slice();
		Ok(self)
	}

	pub fn failure_mode(mut self, failure_mode: FailureMode) -> Self {
		self.failure_mode = failure_mode;
		self
	}
}


// vim: ts=4
