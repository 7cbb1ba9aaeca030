//! Application Configuration
//!
//! The web app description consumed by the build pipeline:
//! - identity (name, package, version)
//! - web content location and start URL
//! - Android permissions and orientation
//! - icon and splash screen sources

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, WebDroidError};

static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)+$").expect("valid package regex"));

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid version regex"));

/// Largest `versionCode` Google Play accepts
pub const MAX_VERSION_CODE: u32 = 2_100_000_000;

/// Screen orientation lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Any,
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Any => "any",
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

/// Splash screen source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplashScreenConfig {
    /// Image composited in the middle of the splash
    pub image: PathBuf,
    /// Background fill, `#RRGGBB`
    #[serde(default = "default_splash_background")]
    pub background_color: String,
    /// How long the splash stays visible
    #[serde(default = "default_splash_duration")]
    pub duration_ms: u32,
}

fn default_splash_background() -> String {
    "#ffffff".to_string()
}

fn default_splash_duration() -> u32 {
    2000
}

/// Web app configuration (webdroid.json / webdroid.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Display name on the launcher
    pub app_name: String,
    /// Android application id, e.g. `com.example.app`
    pub package_name: String,
    /// Semantic version `MAJOR.MINOR.PATCH`
    pub version: String,
    /// Directory holding the built web assets
    pub web_dir: PathBuf,
    /// Entry page inside `web_dir`, or a remote `http(s)` URL
    #[serde(default = "default_start_url")]
    pub start_url: String,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub icon: Option<PathBuf>,
    #[serde(default)]
    pub splash_screen: Option<SplashScreenConfig>,
    #[serde(default)]
    pub allow_navigation: Vec<String>,
    /// Extra Capacitor plugin packages to install
    #[serde(default)]
    pub plugins: Vec<String>,
}

fn default_start_url() -> String {
    "index.html".to_string()
}

fn default_permissions() -> Vec<String> {
    vec!["android.permission.INTERNET".to_string()]
}

impl AppConfig {
    /// Load from a `.json` or `.toml` file; relative paths resolve against the file's directory.
    pub async fn load(path: &Path) -> Result<Self> {
        info!("Loading app configuration from {:?}", path);

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            WebDroidError::config(format!("Cannot read configuration file: {}", e))
                .with_context("path", path.display().to_string())
        })?;

        let mut config = Self::parse(&content, path)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;

        debug!("Loaded configuration for {}", config.package_name);
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_toml = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let parsed = if is_toml {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| {
            WebDroidError::config(format!("Invalid configuration file: {}", e))
                .with_context("path", path.display().to_string())
        })
    }

    /// Make relative asset paths absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.web_dir);
        if let Some(icon) = self.icon.as_mut() {
            resolve(icon);
        }
        if let Some(splash) = self.splash_screen.as_mut() {
            resolve(&mut splash.image);
        }
    }

    /// Check package name and version; reports every offending field at once.
    pub fn validate(&self) -> Result<()> {
        let mut invalid = Vec::new();

        if self.app_name.trim().is_empty() {
            invalid.push("appName");
        }
        if !PACKAGE_NAME_RE.is_match(&self.package_name) {
            invalid.push("packageName");
        }
        if !VERSION_RE.is_match(&self.version) || self.version_code().is_err() {
            invalid.push("version");
        }

        if invalid.is_empty() {
            return Ok(());
        }

        Err(WebDroidError::config(format!(
            "Invalid configuration field(s): {}",
            invalid.join(", ")
        ))
        .with_context("fields", invalid)
        .with_context("packageName", self.package_name.clone())
        .with_context("version", self.version.clone()))
    }

    /// Android `versionCode` derived from the semantic version: `major * 10000 + minor * 100 + patch`
    pub fn version_code(&self) -> Result<u32> {
        let too_large = || {
            WebDroidError::config(format!(
                "Invalid configuration field(s): version ({} exceeds the Android versionCode limit of {})",
                self.version, MAX_VERSION_CODE
            ))
            .with_context("fields", vec!["version"])
            .with_context("version", self.version.clone())
        };

        let mut parts = self.version.split('.').map(|p| p.parse::<u32>());
        let mut next = || parts.next().unwrap_or(Ok(0)).map_err(|_| too_large());
        let (major, minor, patch) = (next()?, next()?, next()?);

        major
            .checked_mul(10_000)
            .and_then(|code| minor.checked_mul(100).and_then(|m| code.checked_add(m)))
            .and_then(|code| code.checked_add(patch))
            .filter(|code| *code <= MAX_VERSION_CODE)
            .ok_or_else(too_large)
    }

    /// Whether the start URL points at a remote site rather than a bundled page
    pub fn is_remote_start_url(&self) -> bool {
        self.start_url.starts_with("http://") || self.start_url.starts_with("https://")
    }

    /// Snapshot used in error contexts
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "appName": self.app_name,
            "packageName": self.package_name,
            "version": self.version,
            "webDir": self.web_dir.display().to_string(),
        })
    }
}
