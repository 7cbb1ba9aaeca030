//! Project Initializer
//!
//! Materializes a Capacitor project from an [`AppConfig`]: scaffolding and web
//! assets, npm dependencies, the native Android platform, and asset syncs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use webdroid_android_toolchain::{EnvManager, Tool, ToolLocator, NATIVE_PLATFORM};
use webdroid_core::{AppConfig, ErrorCategory, Orientation, WebDroidError};

use crate::config::{native_dir, native_main_dir, BuildLimits, CAPACITOR_CONFIG_FILE, WEB_ASSETS_DIR};
use crate::process::{run_step, ProcessRunner, ProcessSpec};
use crate::resources::ResourceProcessor;

/// Capacitor major version pinned in generated `package.json` files
const CAPACITOR_VERSION: &str = "^5.5.0";

/// Configuration snapshot written next to the Capacitor config
pub const CONFIG_SNAPSHOT_FILE: &str = "webdroid.config.json";

/// Generated resources, relative to the project root
const RESOURCES_DIR: &str = "resources";

static SCREEN_ORIENTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"android:screenOrientation="[^"]*""#).expect("valid orientation regex"));

static VERSION_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"versionCode\s+\d+").expect("valid versionCode regex"));

static VERSION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"versionName\s+"[^"]*""#).expect("valid versionName regex"));

/// Initialization failures that have no category yet
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Classified(#[from] WebDroidError),
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl InitError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> InitError {
        let path = path.to_path_buf();
        move |source| InitError::Io { action, path, source }
    }

    /// Categorize once. Errors that already carry a category pass through untouched.
    pub fn into_categorized(self, config: Option<&AppConfig>, project: &Path) -> WebDroidError {
        match self {
            InitError::Classified(err) => err,
            other => {
                let err = WebDroidError::build(format!("Project initialization failed: {}", other))
                    .with_context("projectPath", project.display().to_string());
                match config {
                    Some(config) => err.with_context("config", config.summary()),
                    None => err,
                }
            }
        }
    }
}

type InitResult<T> = Result<T, InitError>;

/// Creates and prepares Capacitor projects
pub struct ProjectInitializer {
    runner: Arc<dyn ProcessRunner>,
    locator: ToolLocator,
    resources: Arc<dyn ResourceProcessor>,
    limits: BuildLimits,
}

impl ProjectInitializer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        locator: ToolLocator,
        resources: Arc<dyn ResourceProcessor>,
        limits: BuildLimits,
    ) -> Self {
        Self {
            runner,
            locator,
            resources,
            limits,
        }
    }

    fn env_manager(&self) -> EnvManager {
        EnvManager::new(self.locator.environment().clone())
    }

    fn tool_spec(&self, tool: Tool, project: &Path) -> ProcessSpec {
        ProcessSpec::new(self.locator.command(tool), project)
            .envs(self.env_manager().command_env())
            .timeout(self.limits.step_timeout)
    }

    async fn run_tool(&self, spec: ProcessSpec, step: &str) -> InitResult<()> {
        run_step(self.runner.as_ref(), &spec, ErrorCategory::Build, step, self.limits.tail_chars).await?;
        Ok(())
    }

    /// Write the project skeleton, web assets and generated resources
    pub async fn create_project(&self, config: &AppConfig, project: &Path) -> InitResult<()> {
        info!("Creating project {} at {:?}", config.app_name, project);

        for dir in [project.to_path_buf(), project.join(WEB_ASSETS_DIR), project.join(RESOURCES_DIR)] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(InitError::io("create", &dir))?;
        }

        write_json(&project.join("package.json"), &package_json(config), "package.json").await?;

        let capacitor = project.join(CAPACITOR_CONFIG_FILE);
        tokio::fs::write(&capacitor, capacitor_config(config)?)
            .await
            .map_err(InitError::io("write", &capacitor))?;

        let snapshot = serde_json::to_value(config).map_err(|source| InitError::Serialize {
            what: "app configuration",
            source,
        })?;
        write_json(&project.join(CONFIG_SNAPSHOT_FILE), &snapshot, "app configuration").await?;

        self.copy_web_assets(config, project).await?;

        match self.resources.generate(config, &project.join(RESOURCES_DIR)).await {
            Ok(generated) => debug!("Generated {} resource files", generated.files.len()),
            Err(e) => warn!("Resource generation failed, continuing without custom resources: {}", e),
        }

        info!("Project structure created");
        Ok(())
    }

    async fn copy_web_assets(&self, config: &AppConfig, project: &Path) -> InitResult<()> {
        let target = project.join(WEB_ASSETS_DIR);

        if config.web_dir.is_dir() {
            let source = tokio::fs::canonicalize(&config.web_dir)
                .await
                .map_err(InitError::io("resolve", &config.web_dir))?;
            let dest = tokio::fs::canonicalize(&target)
                .await
                .map_err(InitError::io("resolve", &target))?;

            // Copying a file onto itself truncates it
            if source == dest {
                info!("Web assets already in place at {:?}", target);
                return Ok(());
            }
            if dest.starts_with(&source) {
                return Err(WebDroidError::build(format!(
                    "Web directory {} contains the project's {} directory; move the project outside it",
                    config.web_dir.display(),
                    WEB_ASSETS_DIR
                ))
                .with_context("webDir", config.web_dir.display().to_string())
                .with_context("projectPath", project.display().to_string())
                .into());
            }

            let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
                .await
                .map_err(|e| InitError::Io {
                    action: "copy web assets into",
                    path: target.clone(),
                    source: std::io::Error::other(e.to_string()),
                })??;
            info!("Copied {} web asset files from {:?}", copied, config.web_dir);
            return Ok(());
        }

        warn!("Web directory {:?} not found, writing a placeholder page", config.web_dir);
        let index = target.join("index.html");
        tokio::fs::write(&index, placeholder_page(config))
            .await
            .map_err(InitError::io("write", &index))
    }

    /// `npm install`, then the configured plugin packages
    pub async fn install_dependencies(&self, project: &Path, plugins: &[String]) -> InitResult<()> {
        info!("Installing npm dependencies");
        self.run_tool(self.tool_spec(Tool::Npm, project).arg("install"), "npm install")
            .await?;

        if !plugins.is_empty() {
            info!("Installing plugins: {}", plugins.join(", "));
            let spec = self.tool_spec(Tool::Npm, project).arg("install").args(plugins.iter().cloned());
            self.run_tool(spec, "npm install plugins").await?;
        }

        Ok(())
    }

    /// Add the Android platform after checking every prerequisite
    pub async fn add_platform(&self, project: &Path) -> InitResult<()> {
        let env = self.env_manager();
        let validation = tokio::task::spawn_blocking(move || env.verify())
            .await
            .map_err(|e| WebDroidError::build(format!("Environment check panicked: {}", e)))?;
        if !validation.is_ready() {
            return Err(WebDroidError::build(format!(
                "Android build environment is incomplete:\n{}",
                validation.report()
            ))
            .with_context("missing", validation.missing_components())
            .into());
        }

        if native_dir(project).is_dir() {
            info!("Android platform already present, skipping `cap add`");
        } else {
            info!("Adding Android platform");
            let spec = self.tool_spec(Tool::Npx, project).args(["cap", "add", NATIVE_PLATFORM]);
            self.run_tool(spec, "cap add android").await?;
        }

        self.install_resources(project).await
    }

    async fn install_resources(&self, project: &Path) -> InitResult<()> {
        let generated = project.join(RESOURCES_DIR).join(NATIVE_PLATFORM);
        if !generated.is_dir() {
            debug!("No generated resources to install");
            return Ok(());
        }

        let res = native_main_dir(project).join("res");
        let dest = res.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&generated, &dest))
            .await
            .map_err(|e| InitError::Io {
                action: "copy resources into",
                path: res.clone(),
                source: std::io::Error::other(e.to_string()),
            })??;

        info!("Installed {} resource files into {:?}", copied, res);
        Ok(())
    }

    /// Apply permissions, orientation and version to the native project
    pub async fn configure_native_project(&self, config: &AppConfig, project: &Path) -> InitResult<()> {
        let manifest_path = native_main_dir(project).join("AndroidManifest.xml");
        if manifest_path.is_file() {
            let manifest = tokio::fs::read_to_string(&manifest_path)
                .await
                .map_err(InitError::io("read", &manifest_path))?;

            let mut patched = apply_permissions(&manifest, &config.permissions);
            if let Some(orientation) = config.orientation {
                patched = apply_orientation(&patched, orientation);
            }

            if patched != manifest {
                tokio::fs::write(&manifest_path, patched)
                    .await
                    .map_err(InitError::io("write", &manifest_path))?;
                debug!("Updated {:?}", manifest_path);
            }
        } else {
            warn!("No AndroidManifest.xml at {:?}", manifest_path);
        }

        let gradle_path = native_dir(project).join("app").join("build.gradle");
        if gradle_path.is_file() {
            let script = tokio::fs::read_to_string(&gradle_path)
                .await
                .map_err(InitError::io("read", &gradle_path))?;
            let patched = apply_version(&script, config.version_code()?, &config.version);
            if patched != script {
                tokio::fs::write(&gradle_path, patched)
                    .await
                    .map_err(InitError::io("write", &gradle_path))?;
            }
        }

        Ok(())
    }

    /// `npx cap sync android` from the project root
    pub async fn sync_project(&self, project: &Path) -> InitResult<()> {
        info!("Syncing web assets into the Android project");
        let spec = self.tool_spec(Tool::Npx, project).args(["cap", "sync", NATIVE_PLATFORM]);
        self.run_tool(spec, "cap sync android").await
    }
}

async fn write_json(path: &Path, value: &serde_json::Value, what: &'static str) -> InitResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|source| InitError::Serialize { what, source })?;
    tokio::fs::write(path, text).await.map_err(InitError::io("write", path))
}

/// Copy every file below `source` into `dest`, returning the file count
fn copy_tree(source: &Path, dest: &Path) -> InitResult<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| InitError::Io {
            action: "walk",
            path: source.to_path_buf(),
            source: e.into(),
        })?;

        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(InitError::io("create", &target))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(InitError::io("create", parent))?;
            }
            std::fs::copy(entry.path(), &target).map_err(InitError::io("copy", entry.path()))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// npm package name derived from the app name
fn npm_name(app_name: &str) -> String {
    let slug: String = app_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    if slug.is_empty() {
        "webdroid-app".to_string()
    } else {
        slug
    }
}

pub fn package_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "name": npm_name(&config.app_name),
        "version": config.version,
        "private": true,
        "scripts": {
            "sync": "npx cap sync android",
            "open": "npx cap open android",
        },
        "dependencies": {
            "@capacitor/android": CAPACITOR_VERSION,
            "@capacitor/core": CAPACITOR_VERSION,
            "@capacitor/splash-screen": CAPACITOR_VERSION,
        },
        "devDependencies": {
            "@capacitor/cli": CAPACITOR_VERSION,
        },
    })
}

/// `capacitor.config.ts` with the configuration embedded as a JSON literal
pub fn capacitor_config(config: &AppConfig) -> InitResult<String> {
    let mut server = json!({ "androidScheme": "https" });
    if config.is_remote_start_url() {
        server["url"] = json!(config.start_url);
        server["cleartext"] = json!(config.start_url.starts_with("http://"));
    }
    if !config.allow_navigation.is_empty() {
        server["allowNavigation"] = json!(config.allow_navigation);
    }

    let mut plugins = json!({});
    if let Some(splash) = &config.splash_screen {
        plugins["SplashScreen"] = json!({
            "launchShowDuration": splash.duration_ms,
            "backgroundColor": splash.background_color,
            "androidSplashResourceName": "splash",
            "showSpinner": false,
        });
    }

    let body = json!({
        "appId": config.package_name,
        "appName": config.app_name,
        "webDir": WEB_ASSETS_DIR,
        "server": server,
        "plugins": plugins,
    });

    let literal = serde_json::to_string_pretty(&body).map_err(|source| InitError::Serialize {
        what: "Capacitor configuration",
        source,
    })?;

    Ok(format!(
        "import type {{ CapacitorConfig }} from '@capacitor/cli';\n\nconst config: CapacitorConfig = {};\n\nexport default config;\n",
        literal
    ))
}

fn placeholder_page(config: &AppConfig) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n  <title>{name}</title>\n</head>\n<body>\n  <h1>{name}</h1>\n</body>\n</html>\n",
        name = escape_html(&config.app_name)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Add a `<uses-permission>` for each permission the manifest lacks
pub fn apply_permissions(manifest: &str, permissions: &[String]) -> String {
    let missing: Vec<&String> = permissions
        .iter()
        .filter(|p| !manifest.contains(&format!("android:name=\"{}\"", p)))
        .collect();
    if missing.is_empty() {
        return manifest.to_string();
    }

    let lines: String = missing
        .iter()
        .map(|p| format!("    <uses-permission android:name=\"{}\" />\n", p))
        .collect();

    let anchor = manifest
        .find("<application")
        .or_else(|| manifest.find("</manifest>"));

    match anchor {
        Some(idx) => {
            let line_start = manifest[..idx].rfind('\n').map(|i| i + 1).unwrap_or(idx);
            format!("{}{}{}", &manifest[..line_start], lines, &manifest[line_start..])
        }
        None => {
            warn!("Manifest has no <application> or </manifest>, permissions not added");
            manifest.to_string()
        }
    }
}

/// Lock the activity orientation; `any` leaves the manifest untouched
pub fn apply_orientation(manifest: &str, orientation: Orientation) -> String {
    if orientation == Orientation::Any {
        return manifest.to_string();
    }

    let attribute = format!("android:screenOrientation=\"{}\"", orientation.as_str());
    if SCREEN_ORIENTATION_RE.is_match(manifest) {
        return SCREEN_ORIENTATION_RE.replace_all(manifest, attribute.as_str()).into_owned();
    }

    manifest.replacen("<activity", &format!("<activity\n            {}", attribute), 1)
}

/// Set `versionCode` / `versionName` in an app `build.gradle`
pub fn apply_version(script: &str, version_code: u32, version_name: &str) -> String {
    let script = VERSION_CODE_RE.replace(script, format!("versionCode {}", version_code).as_str());
    VERSION_NAME_RE
        .replace(&script, format!("versionName \"{}\"", version_name).as_str())
        .into_owned()
}
