//! Gradle Build
//!
//! Runs the Gradle wrapper of the native Android project.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use webdroid_android_toolchain::{EnvManager, ToolLocator};
use webdroid_core::{ErrorCategory, WebDroidError};

use crate::config::{native_dir, BuildLimits, BuildOptions};
use crate::process::{run_step, ProcessOutput, ProcessRunner, ProcessSpec};

/// Gradle property toggling minification of the bundled web assets
pub const MINIFY_PROPERTY: &str = "-PminifyEnabled=true";

/// Gradle build for the `android/` project
pub struct GradleBuild {
    runner: Arc<dyn ProcessRunner>,
    locator: ToolLocator,
    limits: BuildLimits,
}

impl GradleBuild {
    pub fn new(runner: Arc<dyn ProcessRunner>, locator: ToolLocator, limits: BuildLimits) -> Self {
        Self {
            runner,
            locator,
            limits,
        }
    }

    /// Task and flags for one build
    pub fn arguments(options: &BuildOptions) -> Vec<String> {
        let variant = options.variant();
        let mut args = vec![variant.gradle_task().to_string(), variant.verbosity_flag().to_string()];
        if options.minify_web {
            args.push(MINIFY_PROPERTY.to_string());
        }
        args
    }

    fn spec(&self, project: &Path) -> ProcessSpec {
        let android_dir = native_dir(project);
        ProcessSpec::new(self.locator.gradle_wrapper(&android_dir), &android_dir)
            .envs(EnvManager::new(self.locator.environment().clone()).command_env())
            .timeout(self.limits.build_timeout)
    }

    /// `gradlew clean`; a failure is only logged
    pub async fn clean(&self, project: &Path) {
        info!("Cleaning Gradle build...");
        let spec = self.spec(project).arg("clean");

        if let Err(e) = run_step(self.runner.as_ref(), &spec, ErrorCategory::Build, "gradle clean", self.limits.tail_chars).await {
            warn!("Gradle clean failed, but continuing: {}", e);
        }
    }

    /// Assemble the APK for the variant in `options`
    pub async fn assemble(&self, project: &Path, options: &BuildOptions) -> Result<ProcessOutput, WebDroidError> {
        let spec = self.spec(project).args(Self::arguments(options));
        info!("Building Android app with Gradle: {}", spec.args.join(" "));

        let output = run_step(self.runner.as_ref(), &spec, ErrorCategory::Build, "gradle build", self.limits.tail_chars)
            .await
            .map_err(|e| e.with_context("variant", options.variant().as_str()))?;

        info!("Gradle build completed successfully");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exit_with, ok, ScriptedRunner};
    use webdroid_android_toolchain::{Platform, ToolEnvironment};

    fn gradle(runner: Arc<ScriptedRunner>) -> GradleBuild {
        let locator = ToolLocator::new(ToolEnvironment::from_vars([("ANDROID_HOME", "/sdk")], Platform::Posix));
        GradleBuild::new(runner, locator, BuildLimits::default())
    }

    #[test]
    fn test_arguments() {
        assert_eq!(GradleBuild::arguments(&BuildOptions::debug()), vec!["assembleDebug", "--info"]);

        let mut options = BuildOptions::release();
        options.minify_web = true;
        assert_eq!(
            GradleBuild::arguments(&options),
            vec!["assembleRelease", "--stacktrace", "-PminifyEnabled=true"]
        );
    }

    #[tokio::test]
    async fn test_assemble_runs_wrapper_in_android_dir() {
        let runner = ScriptedRunner::new(|_| Ok(ok()));
        gradle(runner.clone())
            .assemble(Path::new("/p"), &BuildOptions::debug())
            .await
            .unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program, Path::new("/p/android/gradlew"));
        assert_eq!(call.cwd, Path::new("/p/android"));
        assert_eq!(call.timeout, Some(BuildLimits::default().build_timeout));
        assert!(call.env.contains(&("ANDROID_HOME".to_string(), "/sdk".to_string())));
    }

    #[tokio::test]
    async fn test_clean_failure_is_not_fatal() {
        let runner = ScriptedRunner::new(|_| Ok(exit_with(1, "FAILURE: Build failed with an exception.")));
        gradle(runner.clone()).clean(Path::new("/p")).await;
        assert_eq!(runner.calls()[0].args, vec!["clean"]);
    }
}
