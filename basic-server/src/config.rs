//! Server configuration from environment variables

use std::path::PathBuf;

use warden_core::rate_limit::{FailureMode, RateLimitConfig};
use warden_types::window::{
	DEFAULT_BAN_DURATION_SECS, DEFAULT_ESCALATION_FACTOR, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS,
};

use crate::prelude::*;

pub struct Config {
	pub db_dir: PathBuf,
	pub listen: Box<str>,
	pub rate_limit: RateLimitConfig,
	/// Copy fallback records into the durable store at startup
	pub migrate_fallback: bool,
	/// Bearer token for the admin endpoints (None = admin API disabled)
	pub admin_token: Option<Box<str>>,
}

impl Config {
	pub fn from_env() -> WdResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> WdResult<Self> {
		let rate_limit = RateLimitConfig::new(
			parse(&var, "RATE_LIMIT", DEFAULT_LIMIT)?,
			parse(&var, "RATE_WINDOW", DEFAULT_WINDOW_SECS)?,
			parse(&var, "ESCALATION_FACTOR", DEFAULT_ESCALATION_FACTOR)?,
			parse(&var, "BAN_DURATION", DEFAULT_BAN_DURATION_SECS)?,
		)?
		.trusted_proxies_from_str(&var("TRUSTED_PROXIES").unwrap_or_default())?
		.failure_mode(parse(&var, "FAILURE_MODE", FailureMode::Open)?);

		Ok(Self {
			db_dir: var("DB_DIR").unwrap_or_else(|| "./data".into()).into(),
			listen: var("LISTEN").unwrap_or_else(|| "127.0.0.1:8080".into()).into(),
			rate_limit,
			migrate_fallback: parse(&var, "MIGRATE_FALLBACK", false)?,
			admin_token: var("ADMIN_TOKEN").filter(|t| !t.is_empty()).map(Into::into),
		})
	}
}

fn parse<T: std::str::FromStr>(
	var: &impl Fn(&str) -> Option<String>,
	name: &str,
	default: T,
) -> WdResult<T> {
	match var(name) {
		Some(value) => value
			.trim()
			.parse()
			.map_err(|_| Error::ConfigurationInvalid(format!("{}={:?}", name, value))),
		None => Ok(default),
	}
}


// vim: ts=4
