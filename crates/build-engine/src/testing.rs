//! Scripted process runner for unit tests

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webdroid_android_toolchain::{Platform, ToolEnvironment, ToolLocator};

use crate::process::{OutputChunk, ProcessError, ProcessOutput, ProcessRunner, ProcessSpec};

type Handler = Box<dyn Fn(&ProcessSpec) -> Result<ProcessOutput, ProcessError> + Send + Sync>;

/// Records every invocation and answers from a handler
pub(crate) struct ScriptedRunner {
    calls: Mutex<Vec<ProcessSpec>>,
    handler: Handler,
}

impl ScriptedRunner {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ProcessSpec) -> Result<ProcessOutput, ProcessError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    /// Every command succeeds; apksigner and keytool write their output files
    pub(crate) fn signing_tools() -> Arc<Self> {
        Self::new(|spec| {
            write_tool_outputs(spec);
            Ok(ok())
        })
    }

    pub(crate) fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().clone()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls().iter().map(ProcessSpec::program_name).collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &ProcessSpec,
        sink: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().push(spec.clone());
        let result = (self.handler)(spec);

        if let (Some(tx), Ok(output)) = (sink, &result) {
            if !output.stdout.is_empty() {
                let _ = tx.send(OutputChunk::Stdout(output.stdout.clone())).await;
            }
            if !output.stderr.is_empty() {
                let _ = tx.send(OutputChunk::Stderr(output.stderr.clone())).await;
            }
        }

        result
    }
}

/// Create the files apksigner (`--out`) and keytool (`-keystore`) would write
pub(crate) fn write_tool_outputs(spec: &ProcessSpec) {
    for flag in ["--out", "-keystore"] {
        if let Some(path) = spec.arg_after(flag) {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(path, b"PK\x03\x04signed");
        }
    }
}

pub(crate) fn ok() -> ProcessOutput {
    ProcessOutput::default()
}

pub(crate) fn exit_with(code: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// SDK directory with an `apksigner` in build-tools, and a locator pointing at it
pub(crate) fn fake_sdk() -> (tempfile::TempDir, ToolLocator) {
    let sdk = tempfile::tempdir().unwrap();
    let tool = sdk.path().join("build-tools").join("34.0.0").join("apksigner");
    std::fs::create_dir_all(tool.parent().unwrap()).unwrap();
    std::fs::write(&tool, b"#!/bin/sh\n").unwrap();

    let env = ToolEnvironment::from_vars(
        [("ANDROID_HOME", sdk.path().to_string_lossy().to_string())],
        Platform::Posix,
    );
    (sdk, ToolLocator::new(env))
}

/// SDK, JDK and an executable `npx` on `PATH`: everything `EnvManager::verify` checks
#[cfg(unix)]
pub(crate) fn ready_environment() -> (tempfile::TempDir, ToolLocator) {
    use std::os::unix::fs::PermissionsExt;

    let root = tempfile::tempdir().unwrap();
    let sdk = root.path().join("sdk");
    let jdk = root.path().join("jdk");
    let bin = root.path().join("bin");

    let apksigner = sdk.join("build-tools").join("34.0.0").join("apksigner");
    std::fs::create_dir_all(apksigner.parent().unwrap()).unwrap();
    std::fs::write(&apksigner, b"#!/bin/sh\n").unwrap();

    std::fs::create_dir_all(jdk.join("bin")).unwrap();
    std::fs::write(jdk.join("bin").join("java"), b"#!/bin/sh\n").unwrap();

    std::fs::create_dir_all(&bin).unwrap();
    let npx = bin.join("npx");
    std::fs::write(&npx, b"#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&npx, std::fs::Permissions::from_mode(0o755)).unwrap();

    let env = ToolEnvironment::from_vars(
        [
            ("ANDROID_HOME", sdk.to_string_lossy().to_string()),
            ("JAVA_HOME", jdk.to_string_lossy().to_string()),
            ("PATH", bin.to_string_lossy().to_string()),
        ],
        Platform::Posix,
    );
    (root, ToolLocator::new(env))
}
