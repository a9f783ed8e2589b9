//! Rate Limiting System
//!
//! Fixed-window request counting per source address with automatic
//! escalation to temporary bans. Records live in a durable window adapter;
//! when it fails the same call is retried on a fallback adapter.

mod api;
mod config;
mod error;
mod extractors;
mod limiter;
mod middleware;
mod migrate;

pub use api::{RateLimitApi, RateLimiterStats};
pub use config::{FailureMode, RateLimitConfig};
pub use error::RateLimitError;
pub use extractors::{IpResolver, CDN_CONNECTING_IP_HEADER, FORWARDED_FOR_HEADER, UNKNOWN_ADDRESS};
pub use limiter::RateLimitManager;
pub use middleware::RateLimitLayer;
pub use migrate::{migrate_fallback, MigrationReport};

// vim: ts=4
