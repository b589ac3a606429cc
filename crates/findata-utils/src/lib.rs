//! Shared utilities for findata-rs

pub mod logging;
pub mod prefs;

pub use logging::init_tracing;
pub use prefs::Prefs;
