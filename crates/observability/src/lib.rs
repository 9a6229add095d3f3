//! Tracing and logging setup shared by binaries and test harnesses.

/// Initialize process-wide logging with defaults (`info`, JSON lines).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init_with("info", LogFormat::Json);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ParseLogFormatError, init_with};
