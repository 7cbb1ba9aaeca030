//! Build Orchestrator
//!
//! Entry point of the pipeline. A build runs
//! VALIDATE_PROJECT → SYNC_ASSETS → INVOKE_BUILD_TOOL → LOCATE_ARTIFACT →
//! COPY_TO_OUTPUT, strictly in sequence; the first failing stage ends it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use webdroid_android_toolchain::{EnvManager, EnvironmentValidation, ToolLocator};
use webdroid_core::{AppConfig, DebugKeystoreConfig, ToolSettings, WebDroidError};

use crate::apk::{copy_to_output, format_size, locate_artifact, ArtifactLocation};
use crate::config::{artifact_dir, native_dir, BuildLimits, BuildOptions, CAPACITOR_CONFIG_FILE};
use crate::gradle_build::GradleBuild;
use crate::process::{absolute, ProcessRunner, TokioProcessRunner};
use crate::project::ProjectInitializer;
use crate::resources::{ImageResourceProcessor, ResourceProcessor};
use crate::signing::{ApkSigner, KeystoreConfig};

/// Pipeline stage, recorded in error contexts as `stage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    ValidateProject,
    SyncAssets,
    InvokeBuildTool,
    LocateArtifact,
    CopyToOutput,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::ValidateProject => "validate-project",
            BuildStage::SyncAssets => "sync-assets",
            BuildStage::InvokeBuildTool => "build",
            BuildStage::LocateArtifact => "locate-artifact",
            BuildStage::CopyToOutput => "copy-to-output",
        }
    }
}

/// Coordinates project creation, builds and signing
pub struct BuildOrchestrator {
    runner: Arc<dyn ProcessRunner>,
    locator: ToolLocator,
    resources: Arc<dyn ResourceProcessor>,
    limits: BuildLimits,
    debug_keystore: DebugKeystoreConfig,
}

impl BuildOrchestrator {
    /// Real processes, the current environment and the given settings
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            runner: Arc::new(TokioProcessRunner),
            locator: ToolLocator::from_process(),
            resources: Arc::new(ImageResourceProcessor),
            limits: BuildLimits::from(settings),
            debug_keystore: settings.debug_keystore.clone(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_locator(mut self, locator: ToolLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_resource_processor(mut self, resources: Arc<dyn ResourceProcessor>) -> Self {
        self.resources = resources;
        self
    }

    fn initializer(&self) -> ProjectInitializer {
        ProjectInitializer::new(self.runner.clone(), self.locator.clone(), self.resources.clone(), self.limits)
    }

    fn gradle(&self) -> GradleBuild {
        GradleBuild::new(self.runner.clone(), self.locator.clone(), self.limits)
    }

    fn signer(&self) -> ApkSigner {
        ApkSigner::new(self.runner.clone(), self.locator.clone(), self.debug_keystore.clone())
            .with_tail_chars(self.limits.tail_chars)
    }

    /// Prerequisite check for the `doctor` command
    pub fn verify_environment(&self) -> EnvironmentValidation {
        EnvManager::new(self.locator.environment().clone()).verify()
    }

    /// Check the files a build needs. Read-only; the first missing one is reported.
    pub fn validate_project(&self, project: &Path) -> Result<(), WebDroidError> {
        let android_dir = native_dir(project);
        let required = [
            ("project directory", project.to_path_buf(), true),
            ("Capacitor configuration", project.join(CAPACITOR_CONFIG_FILE), false),
            ("Android platform directory", android_dir.clone(), true),
            ("app build script", android_dir.join("app").join("build.gradle"), false),
            ("Gradle wrapper", self.locator.gradle_wrapper(&android_dir), false),
        ];

        for (what, path, is_dir) in required {
            let present = if is_dir { path.is_dir() } else { path.is_file() };
            if !present {
                return Err(WebDroidError::build(format!("Missing {}: {}", what, path.display()))
                    .with_context("stage", BuildStage::ValidateProject.as_str())
                    .with_context("missing", path.display().to_string())
                    .with_context("projectPath", project.display().to_string()));
            }
        }

        debug!("Project structure at {:?} is valid", project);
        Ok(())
    }

    /// Build the APK and copy it to `options.output_dir` when set
    pub async fn build_apk(&self, project_path: &Path, options: &BuildOptions) -> Result<ArtifactLocation, WebDroidError> {
        let project = absolute(project_path);
        let variant = options.variant();
        info!("Building {} APK for {:?}", variant.as_str(), project);

        let in_stage = |stage: BuildStage| {
            let project = project.display().to_string();
            move |e: WebDroidError| {
                e.with_context("stage", stage.as_str())
                    .with_context("projectPath", project)
            }
        };

        self.validate_project(&project)?;

        debug!("Stage: {}", BuildStage::SyncAssets.as_str());
        self.initializer()
            .sync_project(&project)
            .await
            .map_err(|e| e.into_categorized(None, &project))
            .map_err(in_stage(BuildStage::SyncAssets))?;

        debug!("Stage: {}", BuildStage::InvokeBuildTool.as_str());
        let gradle = self.gradle();
        if options.clean {
            gradle.clean(&project).await;
        }
        gradle
            .assemble(&project, options)
            .await
            .map_err(in_stage(BuildStage::InvokeBuildTool))?;

        debug!("Stage: {}", BuildStage::LocateArtifact.as_str());
        let artifact = locate_artifact(&artifact_dir(&project, variant))
            .await
            .map_err(in_stage(BuildStage::LocateArtifact))?;

        let artifact = match &options.output_dir {
            Some(output_dir) => {
                debug!("Stage: {}", BuildStage::CopyToOutput.as_str());
                copy_to_output(&artifact, &absolute(output_dir), variant)
                    .await
                    .map_err(in_stage(BuildStage::CopyToOutput))?
            }
            None => artifact,
        };

        info!("Build complete: {:?} ({})", artifact.path, format_size(artifact.size));
        Ok(artifact)
    }

    /// Create a Capacitor project with the Android platform added and synced
    pub async fn initialize_project(&self, config: &AppConfig, project_path: &Path) -> Result<PathBuf, WebDroidError> {
        config.validate()?;
        let project = absolute(project_path);
        info!("Initializing {} ({}) at {:?}", config.app_name, config.package_name, project);

        let init = self.initializer();
        let steps = async {
            init.create_project(config, &project).await?;
            init.install_dependencies(&project, &config.plugins).await?;
            init.add_platform(&project).await?;
            init.configure_native_project(config, &project).await?;
            init.sync_project(&project).await
        };
        steps.await.map_err(|e| e.into_categorized(Some(config), &project))?;

        info!("Project initialized at {:?}", project);
        Ok(project)
    }

    /// Sign with `keystore`, or with the debug keystore when none is given
    pub async fn sign_apk(&self, artifact: &Path, keystore: Option<&KeystoreConfig>) -> Result<PathBuf, WebDroidError> {
        let artifact = absolute(artifact);
        let signer = self.signer();

        match keystore {
            None => {
                info!("No keystore configured, signing with the debug keystore");
                signer.sign_with_debug_keystore(&artifact).await
            }
            Some(keystore) => {
                if !tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
                    return Err(WebDroidError::signing(format!("APK not found: {}", artifact.display()))
                        .with_context("artifact", artifact.display().to_string()));
                }
                signer.sign(&artifact, keystore).await
            }
        }
    }

    /// Whether apksigner accepts the signature of `artifact`
    pub async fn verify_signature(&self, artifact: &Path) -> Result<bool, WebDroidError> {
        self.signer().verify_signature(&absolute(artifact)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use webdroid_android_toolchain::{Platform, ToolEnvironment};
    use webdroid_core::{ErrorCategory, FailureKind};

    use crate::classifier::{classify, GENERIC_FAILURE};
    use crate::process::{ProcessError, ProcessSpec};
    use crate::testing::{exit_with, fake_sdk, ok, write_tool_outputs, ScriptedRunner};

    const ONE_MB: usize = 1024 * 1024;

    /// A project laid out the way `cap add android` leaves it
    fn scaffold() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join(CAPACITOR_CONFIG_FILE), "export default {};").unwrap();
        std::fs::create_dir_all(root.join("android/app")).unwrap();
        std::fs::write(root.join("android/app/build.gradle"), "android {}").unwrap();
        std::fs::write(root.join("android/gradlew"), "#!/bin/sh\n").unwrap();
        dir
    }

    /// Gradle writes an APK of `size` bytes for the requested variant
    fn gradle_producing(size: usize) -> Arc<ScriptedRunner> {
        ScriptedRunner::new(move |spec: &ProcessSpec| {
            let variant = match spec.args.first().map(String::as_str) {
                Some("assembleDebug") => "debug",
                Some("assembleRelease") => "release",
                _ => return Ok(ok()),
            };
            let out = spec.cwd.join("app/build/outputs/apk").join(variant);
            std::fs::create_dir_all(&out).unwrap();
            std::fs::write(out.join(format!("app-{}.apk", variant)), vec![0u8; size]).unwrap();
            Ok(ok())
        })
    }

    fn orchestrator(runner: Arc<ScriptedRunner>, locator: ToolLocator) -> BuildOrchestrator {
        BuildOrchestrator::new(&ToolSettings::default())
            .with_runner(runner)
            .with_locator(locator)
    }

    fn plain_locator() -> ToolLocator {
        ToolLocator::new(ToolEnvironment::from_vars([("ANDROID_HOME", "/sdk")], Platform::Posix))
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            app_name: "Test App".to_string(),
            package_name: "com.test.app".to_string(),
            version: "1.0.0".to_string(),
            web_dir: PathBuf::from("./dist"),
            start_url: "index.html".to_string(),
            permissions: vec!["android.permission.INTERNET".to_string()],
            orientation: None,
            icon: None,
            splash_screen: None,
            allow_navigation: Vec::new(),
            plugins: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_debug_build_is_copied_to_output() {
        let project = scaffold();
        let output = tempfile::tempdir().unwrap();
        let runner = gradle_producing(ONE_MB);

        let options = BuildOptions::debug().with_output_dir(output.path());
        let artifact = orchestrator(runner.clone(), plain_locator())
            .build_apk(project.path(), &options)
            .await
            .unwrap();

        assert!(artifact.path.starts_with(output.path()));
        let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("app-debug"));
        assert_eq!(artifact.size, ONE_MB as u64);
        assert_eq!(runner.programs(), vec!["npx", "gradlew"]);

        let sync = &runner.calls()[0];
        assert_eq!(sync.args, vec!["cap", "sync", "android"]);
        assert_eq!(sync.cwd, project.path());
    }

    #[tokio::test]
    async fn test_release_build_uses_release_task_and_stacktrace() {
        let project = scaffold();
        let runner = gradle_producing(64);

        let artifact = orchestrator(runner.clone(), plain_locator())
            .build_apk(project.path(), &BuildOptions::release())
            .await
            .unwrap();
        assert!(artifact.path.ends_with("android/app/build/outputs/apk/release/app-release.apk"));

        let gradle = &runner.calls()[1];
        assert!(gradle.args.contains(&"assembleRelease".to_string()));
        assert!(gradle.args.contains(&"--stacktrace".to_string()));
        assert!(!gradle.args.contains(&"--info".to_string()));
        assert!(!gradle.args.contains(&"assembleDebug".to_string()));
    }

    #[tokio::test]
    async fn test_clean_runs_before_assemble() {
        let project = scaffold();
        let runner = gradle_producing(64);

        let mut options = BuildOptions::debug();
        options.clean = true;
        orchestrator(runner.clone(), plain_locator())
            .build_apk(project.path(), &options)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[1].args, vec!["clean"]);
        assert_eq!(calls[2].args[0], "assembleDebug");
    }

    #[tokio::test]
    async fn test_build_failure_uses_classified_message() {
        let project = scaffold();
        let runner = ScriptedRunner::new(|spec: &ProcessSpec| {
            if spec.program_name() == "gradlew" {
                Ok(exit_with(1, "FAILURE: Build failed\nAndroid SDK not found at /opt/sdk"))
            } else {
                Ok(ok())
            }
        });

        let err = orchestrator(runner, plain_locator())
            .build_apk(project.path(), &BuildOptions::debug())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Build);
        assert_eq!(err.message(), classify("Android SDK not found"));
        assert_ne!(err.message(), GENERIC_FAILURE);
        assert_eq!(err.failure_kind(), Some(FailureKind::Exit));
        assert_eq!(err.context().get("stage"), Some(&json!("build")));
        assert!(err.context().get("stderrTail").is_some());
    }

    #[tokio::test]
    async fn test_build_timeout_is_distinguishable() {
        let project = scaffold();
        let runner = ScriptedRunner::new(|spec: &ProcessSpec| {
            if spec.program_name() == "gradlew" {
                Err(ProcessError::TimedOut {
                    program: "gradlew".to_string(),
                    timeout: Duration::from_secs(600),
                    stdout: "> Task :app:mergeDebugAssets".to_string(),
                    stderr: String::new(),
                })
            } else {
                Ok(ok())
            }
        });

        let err = orchestrator(runner, plain_locator())
            .build_apk(project.path(), &BuildOptions::debug())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.category(), ErrorCategory::Build);
        assert_eq!(err.context().get("failure"), Some(&json!("timeout")));
    }

    #[tokio::test]
    async fn test_zero_byte_artifact_is_rejected() {
        let project = scaffold();
        let err = orchestrator(gradle_producing(0), plain_locator())
            .build_apk(project.path(), &BuildOptions::debug())
            .await
            .unwrap_err();

        assert!(err.message().contains("empty"));
        assert_eq!(err.context().get("stage"), Some(&json!("locate-artifact")));
    }

    #[tokio::test]
    async fn test_validation_names_first_missing_file_and_is_idempotent() {
        let project = scaffold();
        std::fs::remove_file(project.path().join("android/app/build.gradle")).unwrap();
        let orchestrator = orchestrator(ScriptedRunner::new(|_| Ok(ok())), plain_locator());

        let first = orchestrator.validate_project(project.path()).unwrap_err();
        let second = orchestrator.validate_project(project.path()).unwrap_err();

        assert!(first.message().contains("build.gradle"));
        assert_eq!(first.message(), second.message());

        std::fs::write(project.path().join("android/app/build.gradle"), "android {}").unwrap();
        assert!(orchestrator.validate_project(project.path()).is_ok());
        assert!(orchestrator.validate_project(project.path()).is_ok());
    }

    #[tokio::test]
    async fn test_missing_project_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| Ok(ok()));

        let err = orchestrator(runner.clone(), plain_locator())
            .build_apk(&dir.path().join("missing"), &BuildOptions::debug())
            .await
            .unwrap_err();

        assert!(err.message().starts_with("Missing project directory"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_any_step() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| Ok(ok()));
        let mut config = sample_config();
        config.package_name = "Not A Package".to_string();

        let err = orchestrator(runner.clone(), plain_locator())
            .initialize_project(&config, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(err.message().contains("packageName"));
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join("package.json").exists());
    }

    #[tokio::test]
    async fn test_empty_password_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app-release.apk");
        std::fs::write(&apk, vec![1u8; 128]).unwrap();
        let keystore_file = dir.path().join("release.jks");
        std::fs::write(&keystore_file, b"keystore").unwrap();

        let (_sdk, locator) = fake_sdk();
        let runner = ScriptedRunner::signing_tools();
        let keystore = KeystoreConfig::new(&keystore_file, "", "release", "alias-secret");

        let err = orchestrator(runner.clone(), locator)
            .sign_apk(&apk, Some(&keystore))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Signing);
        assert!(err.message().contains("password"));
        assert!(runner.calls().is_empty());
        assert!(!serde_json::to_string(err.context()).unwrap().contains("alias-secret"));
    }

    #[tokio::test]
    async fn test_verification_failure_is_distinct_from_signing_failure() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app-release.apk");
        std::fs::write(&apk, vec![1u8; 128]).unwrap();
        let keystore_file = dir.path().join("release.jks");
        std::fs::write(&keystore_file, b"keystore").unwrap();

        let (_sdk, locator) = fake_sdk();
        let runner = ScriptedRunner::new(|spec: &ProcessSpec| match spec.args.first().map(String::as_str) {
            Some("sign") => {
                write_tool_outputs(spec);
                Ok(ok())
            }
            _ => Ok(exit_with(1, "DOES NOT VERIFY")),
        });
        let keystore = KeystoreConfig::new(&keystore_file, "store-secret", "release", "alias-secret");

        let err = orchestrator(runner.clone(), locator)
            .sign_apk(&apk, Some(&keystore))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Signing);
        assert!(err.message().contains("verification failed"));
        assert!(!err.message().contains("signing failed"));
        assert_eq!(err.context().get("stage"), Some(&json!("verify")));
        assert_eq!(runner.calls().len(), 2);

        let text = serde_json::to_string(err.context()).unwrap();
        assert!(!text.contains("store-secret"));
        assert!(!text.contains("alias-secret"));
    }

    #[tokio::test]
    async fn test_sign_without_keystore_uses_debug_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app-debug.apk");
        std::fs::write(&apk, vec![1u8; 128]).unwrap();

        let (_sdk, locator) = fake_sdk();
        let runner = ScriptedRunner::signing_tools();
        let mut settings = ToolSettings::default();
        settings.debug_keystore = DebugKeystoreConfig::at(dir.path().join(".android").join("debug.keystore"));

        let signed = BuildOrchestrator::new(&settings)
            .with_runner(runner.clone())
            .with_locator(locator)
            .sign_apk(&apk, None)
            .await
            .unwrap();

        assert!(signed.file_name().unwrap().to_string_lossy().starts_with("app-debug-signed-"));
        assert_eq!(runner.programs(), vec!["keytool", "apksigner", "apksigner"]);
        assert!(dir.path().join(".android/debug.keystore").is_file());
    }
}
