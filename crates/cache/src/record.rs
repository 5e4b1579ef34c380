//! Sidecar checksum record
//!
//! One plain-text file per output directory: the first line is the checksum,
//! every following non-empty line is a generated file path relative to the
//! output directory.

use crate::pattern::MAX_WALK_DEPTH;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the sidecar file inside the output directory.
pub const RECORD_FILE_NAME: &str = ".regen-checksum";

const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Persisted state from the last successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Checksum of inputs and configuration at generation time
    pub checksum: String,
    /// Files present in the output directory after generation
    pub generated_files: BTreeSet<String>,
}

impl ChecksumRecord {
    /// Create a record from a checksum and generated file list.
    #[must_use]
    pub fn new(checksum: impl Into<String>, generated_files: impl IntoIterator<Item = String>) -> Self {
        Self {
            checksum: checksum.into(),
            generated_files: generated_files.into_iter().collect(),
        }
    }

    /// First listed file that no longer exists under `output_dir`.
    ///
    /// Checked against the filesystem on every call. A path whose existence
    /// cannot be determined counts as missing.
    #[must_use]
    pub fn missing_output(&self, output_dir: &Path) -> Option<&str> {
        self.generated_files
            .iter()
            .find(|rel| !matches!(output_dir.join(rel.as_str()).try_exists(), Ok(true)))
            .map(String::as_str)
    }
}

/// Location of the sidecar file for `output_dir`.
#[must_use]
pub fn record_path(output_dir: &Path) -> PathBuf {
    output_dir.join(RECORD_FILE_NAME)
}

/// Read the record for `output_dir`.
///
/// Returns `None` when the sidecar is missing, not a regular file,
/// unreadable, or has no checksum on its first line. None of these are
/// errors: the caller simply regenerates.
#[must_use]
pub fn load(output_dir: &Path) -> Option<ChecksumRecord> {
    let path = record_path(output_dir);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "Checksum file doesn't exist");
        return None;
    }

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Couldn't read checksum file, try removing it if this persists"
            );
            return None;
        }
    };

    let mut lines = content.lines();
    let checksum = lines.next().map(str::trim).unwrap_or_default();
    if checksum.is_empty() {
        tracing::debug!(path = %path.display(), "Checksum file is empty");
        return None;
    }

    Some(ChecksumRecord::new(
        checksum,
        lines.filter(|line| !line.is_empty()).map(str::to_string),
    ))
}

/// List every regular file under `output_dir` (bounded to [`MAX_WALK_DEPTH`]),
/// relative to it and sorted. The sidecar itself is left out.
pub fn list_generated_files(output_dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(output_dir).max_depth(MAX_WALK_DEPTH) {
        let entry = entry.map_err(|e| Error::io(e.into(), output_dir, "walk"))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let rel = path.strip_prefix(output_dir).map_err(|_| {
            Error::configuration(format!(
                "path {} is not under output directory {}",
                path.display(),
                output_dir.display()
            ))
        })?;
        if rel == Path::new(RECORD_FILE_NAME) {
            continue;
        }
        match rel.to_str() {
            Some(name) => files.push(name.to_string()),
            None => {
                tracing::warn!(
                    file = %path.display(),
                    "Generated file name isn't valid UTF-8, it will look missing and the unit will regenerate on every build"
                );
                files.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Write a fresh record for `output_dir`, overwriting any previous one.
///
/// The generated-file list is taken from what is on disk right now.
pub fn save(output_dir: &Path, checksum: &str) -> Result<ChecksumRecord> {
    let files = list_generated_files(output_dir)?;

    let mut body = String::with_capacity(checksum.len() + files.iter().map(|f| f.len() + 2).sum::<usize>() + 2);
    body.push_str(checksum);
    body.push_str(LINE_SEPARATOR);
    for file in &files {
        body.push_str(file);
        body.push_str(LINE_SEPARATOR);
    }

    let path = record_path(output_dir);
    fs::write(&path, body).map_err(|e| Error::io(e, &path, "write"))?;
    tracing::debug!(path = %path.display(), generated_files = files.len(), "Wrote checksum file");

    Ok(ChecksumRecord::new(checksum, files))
}

/// Delete the record for `output_dir`.
///
/// Returns `Ok(false)` when there was nothing to delete.
pub fn invalidate(output_dir: &Path) -> Result<bool> {
    let path = record_path(output_dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed checksum file");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(e, &path, "remove")),
    }
}
