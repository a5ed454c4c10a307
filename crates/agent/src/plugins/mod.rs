//! Built-in plugins.

pub mod session;
pub mod usage;

pub use session::SessionRecorder;
pub use usage::{UsageTotals, UsageTracker};
