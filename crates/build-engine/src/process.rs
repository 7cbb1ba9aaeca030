//! Process Runner
//!
//! Spawns external tools (Gradle, npm, npx, apksigner, keytool), streams their
//! output while it runs and enforces an optional timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webdroid_core::{ErrorCategory, FailureKind, WebDroidError, REDACTED};

use crate::classifier::classify;

/// How long to wait for output pipes to drain after the process exits
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Flags whose following argument is a password
const PASSWORD_FLAGS: &[&str] = &["-storepass", "-keypass", "-srcstorepass", "-deststorepass"];

/// A process invocation
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Absolute working directory
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// File name of the program, e.g. `gradlew`
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Command line for logs, with `pass:` credentials and keytool password values masked
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        let mut mask_next = false;
        for arg in &self.args {
            parts.push(if mask_next {
                REDACTED.to_string()
            } else if arg.starts_with("pass:") {
                format!("pass:{}", REDACTED)
            } else {
                arg.clone()
            });
            mask_next = PASSWORD_FLAGS.contains(&arg.as_str());
        }
        parts.join(" ")
    }

    /// Value following `flag` in the argument list
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// A chunk of live process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, for classification
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Process errors, before they are given a category
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessError::TimedOut { .. } => FailureKind::Timeout,
            ProcessError::Spawn { .. } => FailureKind::Spawn,
            ProcessError::Io { .. } => FailureKind::Io,
        }
    }

    /// Convert into a categorized error, keeping only the output tails
    pub fn into_error(self, category: ErrorCategory, tail_chars: usize) -> WebDroidError {
        let kind = self.kind();
        let message = self.to_string();
        let err = WebDroidError::new(category, message).with_failure(kind);

        match self {
            ProcessError::TimedOut { timeout, stdout, stderr, .. } => err
                .with_context("timeoutSecs", timeout.as_secs())
                .with_context("stdoutTail", tail(&stdout, tail_chars))
                .with_context("stderrTail", tail(&stderr, tail_chars)),
            ProcessError::Spawn { source, .. } | ProcessError::Io { source, .. } => {
                err.with_context("cause", source.to_string())
            }
        }
    }
}

/// Last `max_chars` characters of `text`
pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Spawns external processes
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. A non-zero exit is `Ok`; only spawn failures,
    /// timeouts and pipe errors are `Err`.
    async fn run(
        &self,
        spec: &ProcessSpec,
        sink: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        spec: &ProcessSpec,
        sink: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = spec.program_name();
        debug!("Running: {} (in {:?})", spec.display_command(), spec.cwd);

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, stdout_buf.clone(), sink.clone(), OutputChunk::Stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, stderr_buf.clone(), sink, OutputChunk::Stderr)));
        }

        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("{} exceeded {}s, terminating", program, limit.as_secs());
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill {}: {}", program, e);
                    }
                    let _ = child.wait().await;
                    for pump in &pumps {
                        pump.abort();
                    }
                    return Err(ProcessError::TimedOut {
                        program,
                        timeout: limit,
                        stdout: stdout_buf.lock().clone(),
                        stderr: stderr_buf.lock().clone(),
                    });
                }
            },
            None => child.wait().await,
        };

        let status = waited.map_err(|source| ProcessError::Io {
            program: program.clone(),
            source,
        })?;

        for pump in pumps {
            if tokio::time::timeout(DRAIN_GRACE, pump).await.is_err() {
                debug!("Output of {} still open after exit, not waiting", program);
            }
        }

        let exit_code = status.code().unwrap_or(-1);
        debug!("{} exited with {}", program, exit_code);

        let stdout = stdout_buf.lock().clone();
        let stderr = stderr_buf.lock().clone();
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

async fn pump<R>(
    reader: R,
    buffer: Arc<Mutex<String>>,
    sink: Option<mpsc::Sender<OutputChunk>>,
    wrap: fn(String) -> OutputChunk,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).into_owned();
                buffer.lock().push_str(&text);
                if let Some(tx) = &sink {
                    let _ = tx.send(wrap(text)).await;
                }
            }
        }
    }
}

/// Channel whose chunks are written to the log as they arrive
pub fn log_output(program: &str) -> mpsc::Sender<OutputChunk> {
    let (tx, mut rx) = mpsc::channel::<OutputChunk>(256);
    let program = program.to_string();

    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            match chunk {
                OutputChunk::Stdout(line) => info!(target: "webdroid::tool", "[{}] {}", program, line.trim_end()),
                OutputChunk::Stderr(line) => warn!(target: "webdroid::tool", "[{}] {}", program, line.trim_end()),
            }
        }
    });

    tx
}

/// Run a step and turn every failure into a categorized error.
///
/// The message of a non-zero exit is the classifier's diagnosis; the command,
/// exit code and output tails go into the context.
pub async fn run_step(
    runner: &dyn ProcessRunner,
    spec: &ProcessSpec,
    category: ErrorCategory,
    step: &str,
    tail_chars: usize,
) -> Result<ProcessOutput, WebDroidError> {
    let sink = log_output(&spec.program_name());

    let output = runner
        .run(spec, Some(sink))
        .await
        .map_err(|e| e.into_error(category, tail_chars).with_context("step", step))?;

    if output.success() {
        return Ok(output);
    }

    Err(WebDroidError::new(category, classify(&output.combined()))
        .with_failure(FailureKind::Exit)
        .with_context("step", step)
        .with_context("command", spec.display_command())
        .with_context("cwd", spec.cwd.display().to_string())
        .with_context("exitCode", output.exit_code)
        .with_context("stdoutTail", tail(&output.stdout, tail_chars))
        .with_context("stderrTail", tail(&output.stderr, tail_chars)))
}

/// Absolute form of `path` against the current directory
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("héllo", 4), "éllo");
    }

    #[test]
    fn test_display_command_masks_passwords() {
        let spec = ProcessSpec::new("apksigner", "/tmp").args(["sign", "--ks-pass", "pass:hunter2"]);
        let shown = spec.display_command();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("--ks-pass"));
    }

    #[test]
    fn test_display_command_masks_keytool_passwords() {
        let spec = ProcessSpec::new("keytool", "/tmp").args([
            "-genkeypair",
            "-storepass",
            "MyCustomDebugPw",
            "-alias",
            "androiddebugkey",
            "-keypass",
            "MyCustomDebugPw",
        ]);
        let shown = spec.display_command();
        assert!(!shown.contains("MyCustomDebugPw"));
        assert!(shown.contains("-alias androiddebugkey"));
        assert!(shown.contains(&format!("-storepass {}", REDACTED)));
    }

    #[test]
    fn test_arg_after() {
        let spec = ProcessSpec::new("apksigner", "/tmp").args(["sign", "--out", "/x/signed.apk", "in.apk"]);
        assert_eq!(spec.arg_after("--out"), Some("/x/signed.apk"));
        assert_eq!(spec.arg_after("--ks"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_and_buffers_output() {
        let cwd = std::env::temp_dir();
        let spec = ProcessSpec::new("sh", &cwd).args(["-c", "echo one; echo two 1>&2; exit 3"]);
        let (tx, mut rx) = mpsc::channel(16);

        let output = TokioProcessRunner.run(&spec, Some(tx)).await.unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "one\n");
        assert_eq!(output.stderr, "two\n");

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert!(chunks.contains(&OutputChunk::Stdout("one\n".to_string())));
        assert!(chunks.contains(&OutputChunk::Stderr("two\n".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_distinct() {
        let spec = ProcessSpec::new("sleep", std::env::temp_dir())
            .arg("5")
            .timeout(Duration::from_millis(100));

        let err = TokioProcessRunner.run(&spec, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));

        let err = err.into_error(ErrorCategory::Build, 100);
        assert!(err.is_timeout());
        assert_eq!(err.category(), ErrorCategory::Build);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let spec = ProcessSpec::new("definitely-not-a-real-tool-webdroid", std::env::temp_dir());
        let err = TokioProcessRunner.run(&spec, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(err.kind(), FailureKind::Spawn);
    }

    #[test]
    fn test_wait_failure_is_not_a_spawn_failure() {
        let err = ProcessError::Io {
            program: "gradlew".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.kind(), FailureKind::Io);

        let err = err.into_error(ErrorCategory::Build, 100);
        assert_eq!(err.failure_kind(), Some(FailureKind::Io));
        assert_eq!(err.context().get("failure"), Some(&serde_json::json!("io")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_cwd_surfaces_os_error() {
        let spec = ProcessSpec::new("sh", "/definitely/not/a/dir").args(["-c", "true"]);
        let err = TokioProcessRunner.run(&spec, None).await.unwrap_err();
        match err {
            ProcessError::Spawn { source, .. } => assert_eq!(source.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_step_classifies_non_zero_exit() {
        let spec = ProcessSpec::new("sh", std::env::temp_dir())
            .args(["-c", "echo 'Android SDK not found' 1>&2; exit 1"]);

        let err = run_step(&TokioProcessRunner, &spec, ErrorCategory::Build, "test", 100)
            .await
            .unwrap_err();

        assert_eq!(err.failure_kind(), Some(FailureKind::Exit));
        assert_eq!(err.message(), classify("Android SDK not found"));
    }
}
