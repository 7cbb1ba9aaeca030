//! Environment Checks
//!
//! Verifies the prerequisites for adding the Android platform and prepares the
//! environment handed to child build processes.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::locator::{ToolEnvironment, JAVA_HOME_VAR, SDK_ROOT_VARS};
use crate::platform::Tool;

/// One missing prerequisite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPrerequisite {
    pub name: &'static str,
    pub detail: String,
}

impl std::fmt::Display for MissingPrerequisite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

/// Environment validation result
#[derive(Debug, Default)]
pub struct EnvironmentValidation {
    pub sdk_valid: bool,
    pub jdk_valid: bool,
    pub npx_available: bool,
    pub missing: Vec<MissingPrerequisite>,
}

impl EnvironmentValidation {
    /// Check if environment is ready for Android development
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }

    /// Get list of missing components
    pub fn missing_components(&self) -> Vec<&'static str> {
        self.missing.iter().map(|m| m.name).collect()
    }

    /// One line per missing prerequisite
    pub fn report(&self) -> String {
        self.missing
            .iter()
            .map(|m| format!("  - {}", m))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Environment manager for child build processes
pub struct EnvManager {
    env: ToolEnvironment,
}

impl EnvManager {
    pub fn new(env: ToolEnvironment) -> Self {
        Self { env }
    }

    /// Check every prerequisite, collecting all failures rather than stopping at the first.
    pub fn verify(&self) -> EnvironmentValidation {
        let mut validation = EnvironmentValidation::default();
        let platform = self.env.platform();

        match self.env.sdk_root() {
            Ok(sdk) if sdk.is_dir() => validation.sdk_valid = true,
            Ok(sdk) => validation.missing.push(MissingPrerequisite {
                name: "Android SDK",
                detail: format!("{} does not exist", sdk.display()),
            }),
            Err(_) => validation.missing.push(MissingPrerequisite {
                name: "Android SDK",
                detail: format!("set one of {}", SDK_ROOT_VARS.join(", ")),
            }),
        }

        let java_name = Tool::Java.file_name(platform);
        let java_in_home = self
            .env
            .java_home()
            .map(|home| home.join("bin").join(java_name))
            .filter(|java| java.is_file());

        if java_in_home.is_some() || self.find_on_path(java_name).is_some() {
            validation.jdk_valid = true;
        } else {
            validation.missing.push(MissingPrerequisite {
                name: "JDK",
                detail: format!("set {} or put `java` on PATH", JAVA_HOME_VAR),
            });
        }

        let npx_name = Tool::Npx.file_name(platform);
        if self.find_on_path(npx_name).is_some() {
            validation.npx_available = true;
        } else {
            validation.missing.push(MissingPrerequisite {
                name: "Node.js",
                detail: format!("`{}` is not on PATH", npx_name),
            });
        }

        if validation.is_ready() {
            info!("Android build environment verified");
        } else {
            debug!("Missing prerequisites: {:?}", validation.missing_components());
        }

        validation
    }

    fn find_on_path(&self, binary: &str) -> Option<PathBuf> {
        let path = self.env.path_var()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(binary, Some(path), cwd).ok()
    }

    /// Variables to set on Gradle / Capacitor child processes
    pub fn command_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();

        if let Ok(sdk) = self.env.sdk_root() {
            let sdk = sdk.to_string_lossy().to_string();
            for name in SDK_ROOT_VARS {
                vars.push((name.to_string(), sdk.clone()));
            }
        }

        if let Some(java_home) = self.env.java_home() {
            vars.push((JAVA_HOME_VAR.to_string(), java_home.to_string_lossy().to_string()));
        }

        vars
    }
}
