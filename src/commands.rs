//! CLI commands for WebDroid
//!
//! Thin glue between the command line and [`BuildOrchestrator`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use webdroid_build_engine::{format_size, BuildOptions, BuildOrchestrator, KeystoreConfig};
use webdroid_core::AppConfig;

/// Create a Capacitor project from an app configuration file
pub struct InitCommand {
    pub config_path: PathBuf,
    pub project_path: PathBuf,
}

impl InitCommand {
    pub async fn execute(&self, orchestrator: &BuildOrchestrator) -> Result<PathBuf> {
        let config = AppConfig::load(&self.config_path).await?;
        let project = orchestrator.initialize_project(&config, &self.project_path).await?;

        println!("Project created at {}", project.display());
        Ok(project)
    }
}

/// Build command options
pub struct BuildCommand {
    pub project_path: PathBuf,
    pub options: BuildOptions,
    /// Sign the result with this keystore file, or the debug keystore when `sign` is set without one
    pub keystore: Option<PathBuf>,
    pub sign: bool,
}

impl BuildCommand {
    /// Execute the build command
    pub async fn execute(&self, orchestrator: &BuildOrchestrator) -> Result<PathBuf> {
        info!("Building project: {:?}", self.project_path);

        let artifact = orchestrator.build_apk(&self.project_path, &self.options).await?;
        println!("Built {} ({})", artifact.path.display(), format_size(artifact.size));

        if !self.sign && self.keystore.is_none() {
            return Ok(artifact.path);
        }

        let keystore = match &self.keystore {
            Some(path) => Some(load_keystore(path).await?),
            None => None,
        };
        let signed = orchestrator.sign_apk(&artifact.path, keystore.as_ref()).await?;
        println!("Signed {}", signed.display());
        Ok(signed)
    }
}

/// Sign an existing APK
pub struct SignCommand {
    pub artifact: PathBuf,
    pub keystore: Option<PathBuf>,
}

impl SignCommand {
    pub async fn execute(&self, orchestrator: &BuildOrchestrator) -> Result<PathBuf> {
        let keystore = match &self.keystore {
            Some(path) => Some(load_keystore(path).await?),
            None => None,
        };

        let signed = orchestrator.sign_apk(&self.artifact, keystore.as_ref()).await?;
        println!("Signed {}", signed.display());
        Ok(signed)
    }
}

/// Report missing build prerequisites
pub struct DoctorCommand;

impl DoctorCommand {
    pub fn execute(&self, orchestrator: &BuildOrchestrator) -> Result<bool> {
        let validation = orchestrator.verify_environment();

        let mark = |ok: bool| if ok { "ok" } else { "missing" };
        println!("Android SDK: {}", mark(validation.sdk_valid));
        println!("JDK:         {}", mark(validation.jdk_valid));
        println!("Node.js:     {}", mark(validation.npx_available));

        if !validation.is_ready() {
            println!("\n{}", validation.report());
        }
        Ok(validation.is_ready())
    }
}

/// Keystore credentials from a `.json` or `.toml` file
pub async fn load_keystore(path: &Path) -> Result<KeystoreConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read keystore config {}", path.display()))?;

    let is_toml = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let mut keystore: KeystoreConfig = if is_toml {
        toml::from_str(&content).with_context(|| format!("Invalid keystore config {}", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid keystore config {}", path.display()))?
    };

    if keystore.path.is_relative() {
        if let Some(base) = path.parent() {
            keystore.path = base.join(&keystore.path);
        }
    }
    Ok(keystore)
}
