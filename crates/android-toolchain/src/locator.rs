//! External Tool Locator
//!
//! Resolves `apksigner`, `keytool` and the other executables the build pipeline
//! spawns, from an environment snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::platform::{Platform, Tool};

/// SDK root variables, in priority order
pub const SDK_ROOT_VARS: [&str; 2] = ["ANDROID_HOME", "ANDROID_SDK_ROOT"];

/// JDK root variable
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";

/// Tool location errors
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("Android SDK not found: none of {} is set", .checked.join(", "))]
    SdkRootNotSet { checked: Vec<&'static str> },
    #[error("{tool} not found (searched: {})", display_paths(.searched))]
    ToolNotFound { tool: &'static str, searched: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Snapshot of the environment variables the locator reads
#[derive(Debug, Clone)]
pub struct ToolEnvironment {
    vars: HashMap<String, String>,
    platform: Platform,
}

impl ToolEnvironment {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            platform: Platform::current(),
        }
    }

    /// Build from explicit variables
    pub fn from_vars<I, K, V>(vars: I, platform: Platform) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            platform,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Variable value, treating empty as unset
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// First set SDK root variable
    pub fn sdk_root(&self) -> Result<PathBuf, LocatorError> {
        SDK_ROOT_VARS
            .iter()
            .find_map(|name| self.var(name))
            .map(PathBuf::from)
            .ok_or_else(|| LocatorError::SdkRootNotSet {
                checked: SDK_ROOT_VARS.to_vec(),
            })
    }

    pub fn java_home(&self) -> Option<PathBuf> {
        self.var(JAVA_HOME_VAR).map(PathBuf::from)
    }

    /// Raw `PATH` (or `Path` on Windows)
    pub fn path_var(&self) -> Option<&str> {
        self.var("PATH").or_else(|| self.var("Path"))
    }
}

/// Resolves absolute paths of SDK and JDK tools
#[derive(Debug, Clone)]
pub struct ToolLocator {
    env: ToolEnvironment,
}

impl ToolLocator {
    pub fn new(env: ToolEnvironment) -> Self {
        Self { env }
    }

    pub fn from_process() -> Self {
        Self::new(ToolEnvironment::from_process())
    }

    pub fn environment(&self) -> &ToolEnvironment {
        &self.env
    }

    pub fn platform(&self) -> Platform {
        self.env.platform()
    }

    /// Candidate `apksigner` paths, in priority order
    pub fn signing_tool_candidates(&self) -> Result<Vec<PathBuf>, LocatorError> {
        let sdk = self.env.sdk_root()?;
        let name = Tool::ApkSigner.file_name(self.platform());

        let mut candidates = Vec::new();
        if let Some(version) = latest_build_tools(&sdk.join("build-tools")) {
            candidates.push(sdk.join("build-tools").join(version).join(name));
        }
        candidates.push(sdk.join("cmdline-tools").join("latest").join("bin").join(name));
        candidates.push(sdk.join("tools").join("bin").join(name));

        Ok(candidates)
    }

    /// Locate `apksigner`; the first existing candidate wins
    pub fn locate_signing_tool(&self) -> Result<PathBuf, LocatorError> {
        let candidates = self.signing_tool_candidates()?;

        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => {
                debug!("Using apksigner at {:?}", found);
                Ok(found.clone())
            }
            None => Err(LocatorError::ToolNotFound {
                tool: Tool::ApkSigner.display_name(),
                searched: candidates,
            }),
        }
    }

    /// Locate `keytool`: `$JAVA_HOME/bin` first, otherwise the bare name for `PATH` lookup
    pub fn locate_key_tool(&self) -> PathBuf {
        let name = Tool::KeyTool.file_name(self.platform());

        if let Some(java_home) = self.env.java_home() {
            let candidate = java_home.join("bin").join(name);
            if candidate.is_file() {
                debug!("Using keytool at {:?}", candidate);
                return candidate;
            }
        }

        PathBuf::from(name)
    }

    /// Gradle wrapper script inside a native Android project directory
    pub fn gradle_wrapper(&self, android_dir: &Path) -> PathBuf {
        android_dir.join(Tool::GradleWrapper.file_name(self.platform()))
    }

    /// Bare command name, resolved through `PATH` at spawn time
    pub fn command(&self, tool: Tool) -> PathBuf {
        PathBuf::from(tool.file_name(self.platform()))
    }
}

/// Highest build-tools version directory.
///
/// Plain reverse lexicographic order of the directory names, so `9.0.0` sorts
/// above `34.0.0`. Kept as is for compatibility with existing setups.
pub fn latest_build_tools(build_tools: &Path) -> Option<String> {
    let mut versions: Vec<String> = std::fs::read_dir(build_tools)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    versions.sort_by(|a, b| b.cmp(a));
    versions.into_iter().next()
}
