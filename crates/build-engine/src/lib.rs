//! WebDroid Build Engine
//!
//! Turns a web app into an Android APK by driving external tools:
//! - Capacitor CLI and npm for project creation and asset sync
//! - Gradle for the native build
//! - apksigner and keytool for signing
//!
//! Every tool runs through a [`ProcessRunner`], so the whole pipeline can be
//! exercised without spawning anything.

pub mod apk;
pub mod classifier;
pub mod config;
pub mod gradle_build;
pub mod orchestrator;
pub mod process;
pub mod project;
pub mod resources;
pub mod signing;

#[cfg(test)]
mod testing;

pub use apk::{format_size, ArtifactLocation};
pub use classifier::classify;
pub use config::{BuildLimits, BuildOptions, BuildVariant};
pub use gradle_build::GradleBuild;
pub use orchestrator::{BuildOrchestrator, BuildStage};
pub use process::{OutputChunk, ProcessError, ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use project::{InitError, ProjectInitializer};
pub use resources::{GeneratedResources, ImageResourceProcessor, ResourceProcessor};
pub use signing::{ApkSigner, KeystoreConfig};
