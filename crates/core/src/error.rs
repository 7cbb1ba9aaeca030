//! Error types for WebDroid
//!
//! Every failure that leaves a component is a [`WebDroidError`]: a category tag,
//! a message and a JSON context object. Components keep their own unclassified
//! error enums internally and convert them exactly once at their boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder substituted for any credential in diagnostic output.
pub const REDACTED: &str = "[REDACTED]";

/// Context keys whose values are always treated as credentials.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "aliaspassword",
    "alias_password",
    "keystorepassword",
    "keystore_password",
    "storepassword",
    "store_password",
    "keypassword",
    "key_password",
];

/// Error category surfaced to the CLI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Config,
    Build,
    Signing,
    Resource,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::Build => "BUILD",
            ErrorCategory::Signing => "SIGNING",
            ErrorCategory::Resource => "RESOURCE",
        }
    }

    /// Short remediation hint for users
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "Check the app configuration file: package name, version and paths.",
            ErrorCategory::Build => "Check that the Android SDK and a JDK are installed and that ANDROID_HOME and JAVA_HOME are set.",
            ErrorCategory::Signing => "Check the keystore path, alias and passwords, and that apksigner is available in the SDK build-tools.",
            ErrorCategory::Resource => "Check that the icon and splash images exist and are valid PNG or JPEG files.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an external process failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Process ran and exited non-zero
    Exit,
    /// Process was killed after exceeding its timeout
    Timeout,
    /// Process could not be started at all
    Spawn,
    /// Process started, but its output or exit status could not be read
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Exit => "exit",
            FailureKind::Timeout => "timeout",
            FailureKind::Spawn => "spawn",
            FailureKind::Io => "io",
        }
    }
}

/// Diagnostic key/value pairs attached to an error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorContext(Map<String, Value>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Replace credential-named keys and any literal secret value, recursively.
    pub fn redact(&mut self, secrets: &[&str]) {
        for (key, value) in self.0.iter_mut() {
            redact_entry(key, value, secrets);
        }
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
}

fn redact_entry(key: &str, value: &mut Value, secrets: &[&str]) {
    if is_sensitive_key(key) && !value.is_null() {
        *value = Value::String(REDACTED.to_string());
        return;
    }
    redact_value(value, secrets);
}

fn redact_value(value: &mut Value, secrets: &[&str]) {
    match value {
        Value::String(s) => *s = scrub(s, secrets),
        Value::Array(items) => items.iter_mut().for_each(|v| redact_value(v, secrets)),
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                redact_entry(key, v, secrets);
            }
        }
        _ => {}
    }
}

/// Replace every occurrence of each non-empty secret in `text`.
///
/// Matches are found in the original text in a single pass, longest secret
/// first, so the placeholder itself is never rescanned.
pub fn scrub(text: &str, secrets: &[&str]) -> String {
    let mut secrets: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
    if secrets.is_empty() {
        return text.to_string();
    }
    secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        match secrets.iter().find(|s| rest.starts_with(**s)) {
            Some(secret) => {
                out.push_str(REDACTED);
                rest = &rest[secret.len()..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Main error type for WebDroid
#[derive(Error, Debug, Clone)]
#[error("{category}: {message}")]
pub struct WebDroidError {
    category: ErrorCategory,
    message: String,
    failure: Option<FailureKind>,
    context: ErrorContext,
}

/// Result type alias for WebDroid operations
pub type Result<T> = std::result::Result<T, WebDroidError>;

impl WebDroidError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            failure: None,
            context: ErrorContext::new(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, message)
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Build, message)
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Signing, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Resource, message)
    }

    /// Attach a context field
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    /// Mark the process failure kind; mirrored into the context as `failure`.
    pub fn with_failure(mut self, kind: FailureKind) -> Self {
        self.failure = Some(kind);
        self.context.insert("failure", kind.as_str());
        self
    }

    /// Replace the message, keeping category, failure kind and context
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Strip credentials from the message and context.
    pub fn redacted(mut self, secrets: &[&str]) -> Self {
        self.message = scrub(&self.message, secrets);
        self.context.redact(secrets);
        self
    }

    pub fn hint(&self) -> &'static str {
        self.category.hint()
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        format!("[{}] {}\nHint: {}", self.category, self.message, self.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_includes_category() {
        let err = WebDroidError::config("Invalid packageName");
        assert_eq!(err.to_string(), "CONFIG: Invalid packageName");
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_failure_kind_is_mirrored_in_context() {
        let err = WebDroidError::build("Gradle timed out").with_failure(FailureKind::Timeout);
        assert!(err.is_timeout());
        assert_eq!(err.context().get("failure"), Some(&json!("timeout")));
    }

    #[test]
    fn test_redaction_is_recursive() {
        let err = WebDroidError::signing("apksigner rejected hunter2")
            .with_context(
                "keystore",
                json!({
                    "path": "/tmp/release.jks",
                    "password": "hunter2",
                    "aliasPassword": "s3cret",
                    "nested": [{ "keyPassword": "s3cret" }],
                }),
            )
            .with_context("output", "Failed with --ks-pass pass:hunter2")
            .redacted(&["hunter2", "s3cret"]);

        let text = serde_json::to_string(err.context()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("s3cret"));
        assert!(!err.message().contains("hunter2"));
        assert!(text.contains("/tmp/release.jks"));
        assert!(text.contains(REDACTED));
    }

    #[test]
    fn test_scrub_ignores_empty_secret() {
        assert_eq!(scrub("abc", &[""]), "abc");
    }

    #[test]
    fn test_scrub_secret_inside_placeholder() {
        let out = scrub("pass:RED and pass:A", &["RED", "A"]);
        assert_eq!(out, format!("pass:{0} and pass:{0}", REDACTED));

        let out = scrub("key=abcd", &["ab", "abcd"]);
        assert_eq!(out, format!("key={}", REDACTED));
    }
}
