//! Shared utilities: tracing initialization and wall-clock helpers.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::{now_millis, now_secs};
