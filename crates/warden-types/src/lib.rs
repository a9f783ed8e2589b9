//! Shared types, adapter traits, and core utilities for the Warden rate limiter.
//!
//! This crate contains the foundational types that are shared between the
//! core crate and all window adapter implementations. Keeping the decision
//! table here means every storage backend applies exactly the same rules.

pub mod error;
pub mod prelude;
pub mod types;
pub mod window;
pub mod window_adapter;

// vim: ts=4
