//! APK Artifacts
//!
//! Finding the package Gradle produced and copying it to the requested output
//! directory.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use webdroid_core::WebDroidError;

use crate::config::{BuildVariant, ARTIFACT_EXTENSION};

/// A built package on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// Absolute path
    pub path: PathBuf,
    /// Size in bytes, never zero
    pub size: u64,
}

impl ArtifactLocation {
    /// Stat `path`; missing or empty files are rejected
    pub async fn inspect(path: &Path) -> Result<Self, WebDroidError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            WebDroidError::build(format!("APK not found: {}", path.display()))
                .with_context("path", path.display().to_string())
                .with_context("cause", e.to_string())
        })?;

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(WebDroidError::build(format!("APK is empty: {}", path.display()))
                .with_context("path", path.display().to_string())
                .with_context("size", metadata.len()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }
}

fn has_artifact_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
        .unwrap_or(false)
}

/// Find the APK in a Gradle output directory.
///
/// Candidates are ordered by file name and the first one is taken. Whether the
/// most recently modified file should win instead is an open product question.
pub async fn locate_artifact(dir: &Path) -> Result<ArtifactLocation, WebDroidError> {
    let not_found = || {
        WebDroidError::build(format!("No APK found in {}", dir.display()))
            .with_context("outputDir", dir.display().to_string())
    };

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| not_found().with_context("cause", e.to_string()))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| not_found().with_context("cause", e.to_string()))?
    {
        let path = entry.path();
        if has_artifact_extension(&path) {
            candidates.push(path);
        }
    }

    candidates.sort();
    debug!("APK candidates in {:?}: {:?}", dir, candidates);

    let first = candidates.first().ok_or_else(not_found)?;
    if candidates.len() > 1 {
        warn!("Multiple APKs in {:?}, using {:?}", dir, first);
    }

    let artifact = ArtifactLocation::inspect(first).await?;
    info!("Found APK: {:?} ({})", artifact.path, format_size(artifact.size));
    Ok(artifact)
}

/// `app-<variant>-<timestamp>.apk`
pub fn output_file_name(variant: BuildVariant, timestamp: &str) -> String {
    format!("app-{}-{}.{}", variant.as_str(), timestamp, ARTIFACT_EXTENSION)
}

/// `path` if nothing is there yet, otherwise the first free `<stem>-<n>.<ext>`
pub async fn unclaimed_path(path: PathBuf) -> PathBuf {
    if !is_taken(&path).await {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !is_taken(&candidate).await {
            debug!("{:?} exists, using {:?}", path, candidate);
            return candidate;
        }
        n += 1;
    }
}

async fn is_taken(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(true)
}

/// Copy the artifact into `output_dir` under a timestamped name
pub async fn copy_to_output(
    artifact: &ArtifactLocation,
    output_dir: &Path,
    variant: BuildVariant,
) -> Result<ArtifactLocation, WebDroidError> {
    let copy_error = |action: &str, path: &Path, e: std::io::Error| {
        WebDroidError::build(format!("Failed to {} {}: {}", action, path.display(), e))
            .with_context("artifact", artifact.path.display().to_string())
            .with_context("outputDir", output_dir.display().to_string())
    };

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| copy_error("create", output_dir, e))?;

    let name = output_file_name(variant, &webdroid_core::file_timestamp());
    let destination = unclaimed_path(output_dir.join(name)).await;
    tokio::fs::copy(&artifact.path, &destination)
        .await
        .map_err(|e| copy_error("copy APK to", &destination, e))?;

    let copied = ArtifactLocation::inspect(&destination).await?;
    info!("Copied APK to {:?}", copied.path);
    Ok(copied)
}

/// Get APK size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
