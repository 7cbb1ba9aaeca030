//! WebDroid Core - shared types
//!
//! Error taxonomy, the web app configuration model and the builder's own
//! settings. Everything else in the workspace depends on this crate.

pub mod config;
pub mod error;
pub mod settings;

pub use config::{AppConfig, Orientation, SplashScreenConfig};
pub use error::{ErrorCategory, ErrorContext, FailureKind, Result, WebDroidError, REDACTED};
pub use settings::{DebugKeystoreConfig, ToolSettings};

/// WebDroid version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "WebDroid";

/// Timestamp used in generated artifact names.
///
/// ISO-8601 UTC with milliseconds, `:` and `.` replaced by `-`
/// (`2026-10-19T08-15-30-123Z`).
pub fn file_timestamp() -> String {
    format_file_timestamp(chrono::Utc::now())
}

pub fn format_file_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_timestamp_format() {
        let at = chrono::Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 30).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(format_file_timestamp(at), "2026-10-19T08-15-30-123Z");
    }
}
