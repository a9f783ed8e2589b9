pub use warden_core::prelude::*;

// vim: ts=4
