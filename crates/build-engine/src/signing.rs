//! APK Signing
//!
//! Sign APKs with `apksigner`, using either an explicit keystore or the shared
//! debug keystore, and verify the result.
//!
//! Each `sign` call runs VALIDATE_INPUTS → INVOKE_SIGNING_TOOL →
//! VERIFY_SIGNATURE. The first failing stage ends the call; nothing is retried.
//! Every error leaving this module has the keystore passwords redacted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use webdroid_android_toolchain::ToolLocator;
use webdroid_core::{DebugKeystoreConfig, ErrorCategory, WebDroidError, REDACTED};

use crate::apk::unclaimed_path;
use crate::config::ARTIFACT_EXTENSION;
use crate::process::{run_step, ProcessRunner, ProcessSpec};

/// Signing and keytool runs are short; anything longer is a hung tool
const SIGNING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Keystore credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreConfig {
    pub path: PathBuf,
    pub password: String,
    pub alias: String,
    pub alias_password: String,
}

impl std::fmt::Debug for KeystoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreConfig")
            .field("path", &self.path)
            .field("password", &REDACTED)
            .field("alias", &self.alias)
            .field("alias_password", &REDACTED)
            .finish()
    }
}

impl KeystoreConfig {
    pub fn new(
        path: impl Into<PathBuf>,
        password: impl Into<String>,
        alias: impl Into<String>,
        alias_password: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            password: password.into(),
            alias: alias.into(),
            alias_password: alias_password.into(),
        }
    }

    /// Names of the required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.path.as_os_str().is_empty() {
            missing.push("path");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.alias.is_empty() {
            missing.push("alias");
        }
        if self.alias_password.is_empty() {
            missing.push("aliasPassword");
        }
        missing
    }

    fn secrets(&self) -> [&str; 2] {
        [self.password.as_str(), self.alias_password.as_str()]
    }

    /// Context snapshot; the password fields are masked on redaction
    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path.display().to_string(),
            "alias": self.alias,
            "password": self.password,
            "aliasPassword": self.alias_password,
        })
    }
}

impl From<&DebugKeystoreConfig> for KeystoreConfig {
    fn from(debug: &DebugKeystoreConfig) -> Self {
        Self::new(debug.path.clone(), debug.password.clone(), debug.alias.clone(), debug.password.clone())
    }
}

/// Stage a signing failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStage {
    ValidateInputs,
    InvokeSigningTool,
    VerifySignature,
    DebugKeystore,
}

impl SigningStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningStage::ValidateInputs => "validate",
            SigningStage::InvokeSigningTool => "sign",
            SigningStage::VerifySignature => "verify",
            SigningStage::DebugKeystore => "debug-keystore",
        }
    }
}

/// `<stem>-signed-<timestamp>.<ext>` next to the input
pub fn signed_output_path(artifact: &Path, timestamp: &str) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string());
    let ext = artifact
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| ARTIFACT_EXTENSION.to_string());

    artifact.with_file_name(format!("{}-signed-{}.{}", stem, timestamp, ext))
}

/// APK Signer
pub struct ApkSigner {
    runner: Arc<dyn ProcessRunner>,
    locator: ToolLocator,
    debug_keystore: DebugKeystoreConfig,
    tail_chars: usize,
}

impl ApkSigner {
    /// Create a new APK signer
    pub fn new(runner: Arc<dyn ProcessRunner>, locator: ToolLocator, debug_keystore: DebugKeystoreConfig) -> Self {
        Self {
            runner,
            locator,
            debug_keystore,
            tail_chars: 4000,
        }
    }

    pub fn with_tail_chars(mut self, tail_chars: usize) -> Self {
        self.tail_chars = tail_chars;
        self
    }

    fn signing_error(stage: SigningStage, message: impl Into<String>) -> WebDroidError {
        WebDroidError::signing(message).with_context("stage", stage.as_str())
    }

    /// apksigner lookup scans the SDK build-tools directory
    async fn signing_tool(&self, stage: SigningStage) -> Result<PathBuf, WebDroidError> {
        let locator = self.locator.clone();
        tokio::task::spawn_blocking(move || locator.locate_signing_tool().map_err(|e| e.to_string()))
            .await
            .map_err(|e| Self::signing_error(stage, format!("Signing tool lookup panicked: {}", e)))?
            .map_err(|e| Self::signing_error(stage, e))
    }

    /// Sign `artifact` into a new `-signed-<timestamp>` file and verify it
    pub async fn sign(&self, artifact: &Path, keystore: &KeystoreConfig) -> Result<PathBuf, WebDroidError> {
        self.sign_redacting(artifact, keystore, &keystore.secrets()).await
    }

    async fn sign_redacting(
        &self,
        artifact: &Path,
        keystore: &KeystoreConfig,
        secrets: &[&str],
    ) -> Result<PathBuf, WebDroidError> {
        self.sign_inner(artifact, keystore).await.map_err(|e| {
            e.with_context("artifact", artifact.display().to_string())
                .with_context("keystore", keystore.snapshot())
                .redacted(secrets)
        })
    }

    async fn sign_inner(&self, artifact: &Path, keystore: &KeystoreConfig) -> Result<PathBuf, WebDroidError> {
        // VALIDATE_INPUTS
        validate_artifact(artifact).await?;
        validate_keystore(keystore).await?;

        // INVOKE_SIGNING_TOOL
        let apksigner = self.signing_tool(SigningStage::InvokeSigningTool).await?;

        let output = unclaimed_path(signed_output_path(artifact, &webdroid_core::file_timestamp())).await;
        info!("Signing APK: {:?}", artifact);

        let spec = ProcessSpec::new(&apksigner, working_dir(artifact))
            .args([
                "sign".to_string(),
                "--ks".to_string(),
                keystore.path.to_string_lossy().to_string(),
                "--ks-key-alias".to_string(),
                keystore.alias.clone(),
                "--ks-pass".to_string(),
                format!("pass:{}", keystore.password),
                "--key-pass".to_string(),
                format!("pass:{}", keystore.alias_password),
                "--out".to_string(),
                output.to_string_lossy().to_string(),
                artifact.to_string_lossy().to_string(),
            ])
            .timeout(SIGNING_TIMEOUT);

        debug!("{}", spec.display_command());

        run_step(self.runner.as_ref(), &spec, ErrorCategory::Signing, "apksigner sign", self.tail_chars)
            .await
            .map_err(|e| {
                let message = format!("APK signing failed: {}", e.message());
                e.with_message(message)
                    .with_context("stage", SigningStage::InvokeSigningTool.as_str())
            })?;

        let signed_size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if signed_size == 0 {
            return Err(Self::signing_error(
                SigningStage::InvokeSigningTool,
                format!("APK signing failed: apksigner produced no output at {}", output.display()),
            ));
        }

        // VERIFY_SIGNATURE
        let verify = self.verify_spec(&apksigner, &output);
        run_step(self.runner.as_ref(), &verify, ErrorCategory::Signing, "apksigner verify", self.tail_chars)
            .await
            .map_err(|e| {
                let message = format!("APK was signed but signature verification failed: {}", e.message());
                e.with_message(message)
                    .with_context("stage", SigningStage::VerifySignature.as_str())
                    .with_context("signedArtifact", output.display().to_string())
            })?;

        info!("APK signed successfully: {:?}", output);
        Ok(output)
    }

    fn verify_spec(&self, apksigner: &Path, artifact: &Path) -> ProcessSpec {
        ProcessSpec::new(apksigner, working_dir(artifact))
            .args(["verify".to_string(), "--verbose".to_string(), artifact.to_string_lossy().to_string()])
            .timeout(SIGNING_TIMEOUT)
    }

    /// Verify APK signature; `Ok(false)` when apksigner rejects it
    pub async fn verify_signature(&self, artifact: &Path) -> Result<bool, WebDroidError> {
        let apksigner = self.signing_tool(SigningStage::VerifySignature).await?;

        let spec = self.verify_spec(&apksigner, artifact);
        let output = self
            .runner
            .run(&spec, None)
            .await
            .map_err(|e| e.into_error(ErrorCategory::Signing, self.tail_chars))?;

        Ok(output.success())
    }

    /// Sign with the shared debug keystore, generating it first if it does not exist
    pub async fn sign_with_debug_keystore(&self, artifact: &Path) -> Result<PathBuf, WebDroidError> {
        let keystore = KeystoreConfig::from(&self.debug_keystore);
        // The default `android` password is public and also appears in paths,
        // so only the credential fields are masked for it. A configured one is scrubbed everywhere.
        let password = self.debug_keystore.password.as_str();
        let secrets: &[&str] = if password == DebugKeystoreConfig::PASSWORD {
            &[]
        } else {
            std::slice::from_ref(&password)
        };
        self.ensure_debug_keystore().await.map_err(|e| e.redacted(secrets))?;
        self.sign_redacting(artifact, &keystore, secrets).await
    }

    /// Create the debug keystore when it is missing.
    ///
    /// The check hits the filesystem every time since the file may be deleted
    /// between runs. Two processes creating it at once can race; not handled.
    pub async fn ensure_debug_keystore(&self) -> Result<PathBuf, WebDroidError> {
        let config = &self.debug_keystore;
        let exists = tokio::fs::metadata(&config.path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);

        if exists {
            debug!("Using debug keystore {:?}", config.path);
            return Ok(config.path.clone());
        }

        info!("Generating debug keystore: {:?}", config.path);

        let parent = config.path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&parent).await.map_err(|e| {
            Self::signing_error(
                SigningStage::DebugKeystore,
                format!("Failed to create {}: {}", parent.display(), e),
            )
        })?;

        let locator = self.locator.clone();
        let keytool = tokio::task::spawn_blocking(move || locator.locate_key_tool())
            .await
            .map_err(|e| Self::signing_error(SigningStage::DebugKeystore, format!("keytool lookup panicked: {}", e)))?;
        let spec = ProcessSpec::new(keytool, &parent)
            .args([
                "-genkeypair".to_string(),
                "-v".to_string(),
                "-keystore".to_string(),
                config.path.to_string_lossy().to_string(),
                "-storepass".to_string(),
                config.password.clone(),
                "-alias".to_string(),
                config.alias.clone(),
                "-keypass".to_string(),
                config.password.clone(),
                "-keyalg".to_string(),
                "RSA".to_string(),
                "-keysize".to_string(),
                "2048".to_string(),
                "-validity".to_string(),
                config.validity_days.to_string(),
                "-dname".to_string(),
                config.distinguished_name.clone(),
            ])
            .timeout(SIGNING_TIMEOUT);

        run_step(self.runner.as_ref(), &spec, ErrorCategory::Signing, "keytool -genkeypair", self.tail_chars)
            .await
            .map_err(|e| {
                let message = format!("Failed to create debug keystore: {}", e.message());
                e.with_message(message)
                    .with_context("stage", SigningStage::DebugKeystore.as_str())
                    .with_context("keystorePath", config.path.display().to_string())
            })?;

        validate_keystore_file(&config.path).await?;
        info!("Keystore generated successfully");
        Ok(config.path.clone())
    }
}

fn working_dir(artifact: &Path) -> PathBuf {
    artifact
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn validate_artifact(artifact: &Path) -> Result<(), WebDroidError> {
    let stage = SigningStage::ValidateInputs;

    let has_extension = artifact
        .extension()
        .map(|e| e.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
        .unwrap_or(false);
    if !has_extension {
        return Err(ApkSigner::signing_error(
            stage,
            format!("Not an APK file (expected .{}): {}", ARTIFACT_EXTENSION, artifact.display()),
        ));
    }

    match tokio::fs::metadata(artifact).await {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
        Ok(_) => Err(ApkSigner::signing_error(stage, format!("APK is empty: {}", artifact.display()))),
        Err(_) => Err(ApkSigner::signing_error(stage, format!("APK not found: {}", artifact.display()))),
    }
}

async fn validate_keystore(keystore: &KeystoreConfig) -> Result<(), WebDroidError> {
    let missing = keystore.missing_fields();
    if !missing.is_empty() {
        return Err(ApkSigner::signing_error(
            SigningStage::ValidateInputs,
            format!("Keystore configuration is missing required field(s): {}", missing.join(", ")),
        )
        .with_context("missingFields", missing));
    }

    validate_keystore_file(&keystore.path).await
}

async fn validate_keystore_file(path: &Path) -> Result<(), WebDroidError> {
    let stage = SigningStage::ValidateInputs;
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
        Ok(_) => Err(ApkSigner::signing_error(stage, format!("Keystore file is empty: {}", path.display()))),
        Err(_) => Err(ApkSigner::signing_error(stage, format!("Keystore file not found: {}", path.display()))),
    }
}
