//! Tracing and logging setup shared by every binary and test harness.

/// Initialize process-wide logging with the default settings.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&tracing::LogConfig::from_env());
}

/// Subscriber configuration (filters, output format).
pub mod tracing;
