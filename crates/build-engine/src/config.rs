//! Build Configuration
//!
//! Build options and the native project layout conventions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use webdroid_core::ToolSettings;

/// Directory of the native Android project inside a web project
pub const NATIVE_DIR: &str = "android";

/// Artifact file extension
pub const ARTIFACT_EXTENSION: &str = "apk";

/// Capacitor configuration file written into every project
pub const CAPACITOR_CONFIG_FILE: &str = "capacitor.config.ts";

/// Web assets directory inside the project
pub const WEB_ASSETS_DIR: &str = "www";

/// Build variant (debug/release)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    #[default]
    Debug,
    Release,
}

impl BuildVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
        }
    }

    pub fn gradle_task(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "assembleDebug",
            BuildVariant::Release => "assembleRelease",
        }
    }

    /// Gradle logging flag
    pub fn verbosity_flag(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "--info",
            BuildVariant::Release => "--stacktrace",
        }
    }
}

/// Options for one build invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub release: bool,
    /// Copy the artifact here when set
    pub output_dir: Option<PathBuf>,
    pub minify_web: bool,
    /// Run `gradlew clean` first
    pub clean: bool,
}

impl BuildOptions {
    pub fn debug() -> Self {
        Self::default()
    }

    pub fn release() -> Self {
        Self {
            release: true,
            ..Default::default()
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn variant(&self) -> BuildVariant {
        if self.release {
            BuildVariant::Release
        } else {
            BuildVariant::Debug
        }
    }
}

/// Limits applied to external tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildLimits {
    /// Overall timeout for the Gradle build
    pub build_timeout: Duration,
    /// Timeout for npm / Capacitor CLI steps
    pub step_timeout: Duration,
    /// Characters of output kept in failure contexts
    pub tail_chars: usize,
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            build_timeout: Duration::from_secs(10 * 60),
            step_timeout: Duration::from_secs(10 * 60),
            tail_chars: 4000,
        }
    }
}

impl From<&ToolSettings> for BuildLimits {
    fn from(settings: &ToolSettings) -> Self {
        Self {
            build_timeout: settings.build_timeout(),
            tail_chars: settings.output_tail_chars,
            ..Default::default()
        }
    }
}

/// `<project>/android`
pub fn native_dir(project: &Path) -> PathBuf {
    project.join(NATIVE_DIR)
}

/// `<project>/android/app/build/outputs/apk/<variant>`
pub fn artifact_dir(project: &Path, variant: BuildVariant) -> PathBuf {
    native_dir(project)
        .join("app")
        .join("build")
        .join("outputs")
        .join(ARTIFACT_EXTENSION)
        .join(variant.as_str())
}

/// `<project>/android/app/src/main`
pub fn native_main_dir(project: &Path) -> PathBuf {
    native_dir(project).join("app").join("src").join("main")
}
