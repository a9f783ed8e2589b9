//! Core of the Warden rate limiter.
//!
//! Request handlers call [`rate_limit::RateLimitManager::admit`] before doing
//! their own work. The manager resolves the caller's address, runs the
//! admission check against the durable window adapter and transparently
//! falls back to the fallback adapter when the durable one fails.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod prelude;
pub mod rate_limit;

pub use rate_limit::{RateLimitLayer, RateLimitManager};

// vim: ts=4
