//! WebDroid command line
//!
//! `webdroid init | build | sign | doctor`

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webdroid::build::{BuildOptions, BuildOrchestrator};
use webdroid::commands::{BuildCommand, DoctorCommand, InitCommand, SignCommand};
use webdroid::core::{ToolSettings, WebDroidError, APP_NAME, VERSION};

#[derive(Parser)]
#[command(name = "webdroid", version, about = "Turn a web application into a signed Android APK")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/webdroid/config.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a Capacitor project with the Android platform
    Init {
        /// App configuration (.json or .toml)
        config: PathBuf,
        /// Directory to create the project in
        project: PathBuf,
    },
    /// Build an APK
    Build {
        project: PathBuf,
        #[arg(long)]
        release: bool,
        /// Copy the APK here
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        minify: bool,
        /// Run `gradlew clean` first
        #[arg(long)]
        clean: bool,
        /// Sign the APK after building
        #[arg(long)]
        sign: bool,
        /// Keystore credentials file (.json or .toml); implies --sign
        #[arg(long)]
        keystore: Option<PathBuf>,
    },
    /// Sign an APK, with the debug keystore unless --keystore is given
    Sign {
        apk: PathBuf,
        #[arg(long)]
        keystore: Option<PathBuf>,
    },
    /// Check the Android SDK, JDK and Node.js setup
    Doctor,
}

/// Main entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("{} v{} starting...", APP_NAME, VERSION);

    let code = match run(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            report(&err);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<bool> {
    let settings_path = cli
        .settings
        .unwrap_or_else(|| ToolSettings::config_dir().join("config.toml"));
    let settings = ToolSettings::load_or_create(&settings_path).await?;
    let orchestrator = BuildOrchestrator::new(&settings);

    match cli.command {
        Command::Init { config, project } => {
            InitCommand {
                config_path: config,
                project_path: project,
            }
            .execute(&orchestrator)
            .await?;
        }
        Command::Build {
            project,
            release,
            output,
            minify,
            clean,
            sign,
            keystore,
        } => {
            let options = BuildOptions {
                release,
                output_dir: output,
                minify_web: minify,
                clean,
            };
            BuildCommand {
                project_path: project,
                options,
                keystore,
                sign,
            }
            .execute(&orchestrator)
            .await?;
        }
        Command::Sign { apk, keystore } => {
            SignCommand { artifact: apk, keystore }.execute(&orchestrator).await?;
        }
        Command::Doctor => return DoctorCommand.execute(&orchestrator),
    }

    Ok(true)
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<WebDroidError>() {
        Some(err) => {
            error!("{}", err.user_message());
            if !err.context().is_empty() {
                match serde_json::to_string_pretty(err.context()) {
                    Ok(context) => error!("Context: {}", context),
                    Err(e) => error!("Context unavailable: {}", e),
                }
            }
        }
        None => error!("{:#}", err),
    }
}
