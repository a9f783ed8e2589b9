pub use warden_types::prelude::*;
pub use warden_types::window::{Decision, Denial, DenyReason, RateRecord, WindowPolicy};
pub use warden_types::window_adapter::WindowAdapter;

// vim: ts=4
