//! WebDroid - web app to Android APK builder
//!
//! Packages a web application as a Capacitor Android project, builds it with
//! Gradle and signs the result.
//!
//! ## Architecture
//!
//! - `webdroid-core`: errors, app configuration and builder settings
//! - `webdroid-android-toolchain`: SDK/JDK tool lookup and environment checks
//! - `webdroid-build-engine`: process runner, project setup, Gradle, signing

pub mod commands;

// Re-export main components for library usage
pub use webdroid_android_toolchain as toolchain;
pub use webdroid_build_engine as build;
pub use webdroid_core as core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use webdroid_build_engine::{ArtifactLocation, BuildOptions, BuildOrchestrator, KeystoreConfig};
    pub use webdroid_core::{AppConfig, ErrorCategory, ToolSettings, WebDroidError};
}
