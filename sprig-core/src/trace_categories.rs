//! Trace utilities

/// Trace category for process launch.
pub const LAUNCH: &str = "launch";
/// Trace category for output capture.
pub const READERS: &str = "readers";
/// Trace category for executable resolution.
pub const RESOLVE: &str = "resolve";
/// Trace category for signal delivery.
pub const SIGNALS: &str = "signals";
