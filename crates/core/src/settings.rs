//! Tool Settings
//!
//! Settings for the builder itself, stored in `~/.config/webdroid/config.toml`.
//! Built once at startup and handed to the components that need them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WebDroidError};

/// Fixed debug keystore parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugKeystoreConfig {
    pub path: PathBuf,
    pub password: String,
    pub alias: String,
    pub validity_days: u32,
    pub distinguished_name: String,
}

impl DebugKeystoreConfig {
    pub const PASSWORD: &'static str = "android";
    pub const ALIAS: &'static str = "androiddebugkey";
    pub const VALIDITY_DAYS: u32 = 10000;

    /// Standard location: `~/.android/debug.keystore`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".android")
            .join("debug.keystore")
    }

    /// Same credentials, different location (used by tests and custom setups)
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

impl Default for DebugKeystoreConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            password: Self::PASSWORD.to_string(),
            alias: Self::ALIAS.to_string(),
            validity_days: Self::VALIDITY_DAYS,
            distinguished_name: "CN=Android Debug,O=Android,C=US".to_string(),
        }
    }
}

/// Builder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Overall timeout for one build-tool run, in seconds
    pub build_timeout_secs: u64,
    /// Characters of stdout/stderr kept in failure contexts
    pub output_tail_chars: usize,
    pub debug_keystore: DebugKeystoreConfig,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            build_timeout_secs: 600,
            output_tail_chars: 4000,
            debug_keystore: DebugKeystoreConfig::default(),
        }
    }
}

impl ToolSettings {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Directory holding `config.toml`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webdroid")
    }

    /// Load settings, writing the defaults first if the file does not exist
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("Loading settings from {:?}", path);
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| settings_error("read", path, e))?;
            return toml::from_str(&content).map_err(|e| settings_error("parse", path, e));
        }

        info!("Creating default settings at {:?}", path);
        let settings = Self::default();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| settings_error("create", parent, e))?;
        }

        let content = toml::to_string_pretty(&settings).map_err(|e| settings_error("serialize", path, e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| settings_error("write", path, e))?;

        Ok(settings)
    }
}

fn settings_error(action: &str, path: &Path, err: impl std::fmt::Display) -> WebDroidError {
    WebDroidError::config(format!("Failed to {} settings: {}", action, err))
        .with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_keystore_defaults() {
        let ks = DebugKeystoreConfig::default();
        assert_eq!(ks.password, "android");
        assert_eq!(ks.alias, "androiddebugkey");
        assert!(ks.path.ends_with(".android/debug.keystore"));
    }

    #[tokio::test]
    async fn test_load_or_create_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = ToolSettings::load_or_create(&path).await.unwrap();
        assert!(path.exists());

        let loaded = ToolSettings::load_or_create(&path).await.unwrap();
        assert_eq!(created, loaded);
        assert_eq!(loaded.build_timeout(), Duration::from_secs(600));
    }
}
