//! Host platform conventions
//!
//! Executable names differ between Windows and POSIX hosts. All of them come
//! from one table so both variants can be checked on any host.

use serde::{Deserialize, Serialize};

/// Host platform family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// Separator used in `PATH`
    pub fn path_separator(&self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Posix => ':',
        }
    }
}

/// External executables the pipeline invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ApkSigner,
    KeyTool,
    Java,
    GradleWrapper,
    Npm,
    Npx,
}

/// (tool, POSIX file name, Windows file name)
const TOOL_NAMES: &[(Tool, &str, &str)] = &[
    (Tool::ApkSigner, "apksigner", "apksigner.bat"),
    (Tool::KeyTool, "keytool", "keytool.exe"),
    (Tool::Java, "java", "java.exe"),
    (Tool::GradleWrapper, "gradlew", "gradlew.bat"),
    (Tool::Npm, "npm", "npm.cmd"),
    (Tool::Npx, "npx", "npx.cmd"),
];

impl Tool {
    /// Executable file name on the given platform
    pub fn file_name(&self, platform: Platform) -> &'static str {
        TOOL_NAMES
            .iter()
            .find(|(tool, _, _)| tool == self)
            .map(|(_, posix, windows)| match platform {
                Platform::Posix => *posix,
                Platform::Windows => *windows,
            })
            .unwrap_or("")
    }

    /// Name without any platform suffix, for messages
    pub fn display_name(&self) -> &'static str {
        self.file_name(Platform::Posix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_per_platform() {
        assert_eq!(Tool::ApkSigner.file_name(Platform::Posix), "apksigner");
        assert_eq!(Tool::ApkSigner.file_name(Platform::Windows), "apksigner.bat");
        assert_eq!(Tool::KeyTool.file_name(Platform::Windows), "keytool.exe");
        assert_eq!(Tool::GradleWrapper.file_name(Platform::Windows), "gradlew.bat");
        assert_eq!(Tool::Npx.file_name(Platform::Windows), "npx.cmd");
        assert_eq!(Tool::Npx.file_name(Platform::Posix), "npx");
    }

    #[test]
    fn test_every_tool_has_names() {
        for tool in [Tool::ApkSigner, Tool::KeyTool, Tool::Java, Tool::GradleWrapper, Tool::Npm, Tool::Npx] {
            assert!(!tool.file_name(Platform::Posix).is_empty());
            assert!(!tool.file_name(Platform::Windows).is_empty());
        }
    }
}
