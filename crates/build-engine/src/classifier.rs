//! Build Failure Classifier
//!
//! Turns raw tool output into a one-line diagnosis.

use once_cell::sync::Lazy;
use regex::Regex;

/// Returned when nothing in the output is recognizable
pub const GENERIC_FAILURE: &str =
    "Build failed for an unknown reason. Re-run with --verbose to see the full tool output.";

/// Line markers used when no known signature matches
const LINE_MARKERS: &[&str] = &["ERROR:", "FAILURE:", "Exception:"];

/// Known failure signatures, checked in order
static KNOWN_FAILURES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)Android SDK not found|SDK location not found|ANDROID_(HOME|SDK_ROOT) .*not (set|found)",
            "Android SDK not found. Set ANDROID_HOME or ANDROID_SDK_ROOT to your SDK location.",
        ),
        (
            r"(?i)JAVA_HOME is not set|No Java runtime present|java: command not found",
            "Java not found. Install a JDK (17 or newer) and set JAVA_HOME.",
        ),
        (
            r"Unsupported class file major version|requires Java 1[1-9]|Android Gradle plugin requires Java",
            "Incompatible Java version. The Android Gradle plugin requires JDK 17 or newer.",
        ),
        (
            r"(?i)licen[cs]es? (for the following|have not been accepted)|Failed to install the following Android SDK packages",
            "Android SDK licenses have not been accepted. Run `sdkmanager --licenses`.",
        ),
        (
            r"OutOfMemoryError|Java heap space|Expiring Daemon because JVM heap space is exhausted",
            "Gradle ran out of memory. Increase org.gradle.jvmargs in android/gradle.properties.",
        ),
        (
            r"Could not resolve all (files|dependencies|artifacts)|Could not GET|Could not download",
            "Failed to download build dependencies. Check your network connection and proxy settings.",
        ),
        (
            r"(?i)No space left on device|ENOSPC",
            "No space left on device.",
        ),
        (
            r"Keystore was tampered with|password was incorrect|Failed to load signer",
            "Keystore password is incorrect or the keystore is corrupted.",
        ),
        (
            r"(?i)alias .* does not exist|No key with alias|Key alias .* not found",
            "Key alias not found in the keystore.",
        ),
        (
            r"(?i)could not determine executable to run|npm ERR! code E404|Cannot find module '@capacitor",
            "Capacitor CLI not available. Run `npm install` in the project directory.",
        ),
        (
            r"(?i)EACCES|Permission denied",
            "Permission denied while running a build tool. Check file permissions (for example `chmod +x android/gradlew`).",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, message)| Regex::new(pattern).ok().map(|re| (re, message)))
    .collect()
});

/// Diagnose tool output. Never returns an empty string.
pub fn classify(output: &str) -> String {
    if let Some((_, message)) = KNOWN_FAILURES.iter().find(|(re, _)| re.is_match(output)) {
        return (*message).to_string();
    }

    output
        .lines()
        .find(|line| LINE_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_signature() {
        let msg = classify("> Configure project :app\nAndroid SDK not found\n");
        assert_eq!(msg, "Android SDK not found. Set ANDROID_HOME or ANDROID_SDK_ROOT to your SDK location.");
    }

    #[test]
    fn test_first_signature_wins() {
        let msg = classify("java.lang.OutOfMemoryError\nSDK location not found");
        assert!(msg.starts_with("Android SDK not found"));
    }

    #[test]
    fn test_marker_line_fallback() {
        let output = "Starting a Gradle Daemon\n  FAILURE: Build failed with an exception.  \n* What went wrong:";
        assert_eq!(classify(output), "FAILURE: Build failed with an exception.");
    }

    #[test]
    fn test_exception_marker() {
        assert_eq!(
            classify("at foo\njava.io.IOException: broken pipe\n"),
            "java.io.IOException: broken pipe"
        );
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(classify(""), GENERIC_FAILURE);
        assert_eq!(classify("BUILD FAILED in 3s"), GENERIC_FAILURE);
    }

    #[test]
    fn test_deterministic() {
        let text = "ERROR: something broke";
        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(KNOWN_FAILURES.len(), 11);
    }
}
