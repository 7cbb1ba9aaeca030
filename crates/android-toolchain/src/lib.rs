//! Android Toolchain
//!
//! Locates the SDK and JDK executables the build pipeline spawns and checks
//! that the environment can build an Android project:
//! - `apksigner` from the SDK build-tools
//! - `keytool` from the JDK
//! - Gradle wrapper, `npm` and `npx`

pub mod env;
pub mod locator;
pub mod platform;

pub use env::{EnvManager, EnvironmentValidation, MissingPrerequisite};
pub use locator::{latest_build_tools, LocatorError, ToolEnvironment, ToolLocator, SDK_ROOT_VARS};
pub use platform::{Platform, Tool};

/// Native platform added to every project
pub const NATIVE_PLATFORM: &str = "android";
