//! Additive-overwrite directory merging
//!
//! Source content always wins on a path collision. Content that only exists
//! in the destination is never touched, so user customizations in a live
//! settings tree survive every merge.

use filetime::{set_file_mtime, FileTime};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Counters collected while merging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Files written to a path that did not exist yet
    pub files_copied: usize,
    /// Files that replaced an existing destination file
    pub files_overwritten: usize,
    pub directories_created: usize,
}

impl MergeReport {
    pub fn total_files(&self) -> usize {
        self.files_copied + self.files_overwritten
    }
}

/// Merges a source tree into a destination tree
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryMerger;

impl DirectoryMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `source` into `destination`
    ///
    /// Returns [`SyncError::SourceMissing`] when `source` does not exist; the
    /// destination is left untouched in that case.
    pub fn merge(&self, source: &Path, destination: &Path) -> Result<MergeReport> {
        if !source.is_dir() {
            return Err(SyncError::SourceMissing {
                path: source.to_path_buf(),
            });
        }

        let mut report = MergeReport::default();
        merge_dir(source, destination, &mut report)?;

        info!(
            "Merged {} -> {}: {} new, {} overwritten, {} directories created",
            source.display(),
            destination.display(),
            report.files_copied,
            report.files_overwritten,
            report.directories_created
        );

        Ok(report)
    }
}

fn merge_dir(source: &Path, destination: &Path, report: &mut MergeReport) -> Result<()> {
    if !destination.is_dir() {
        fs::create_dir_all(destination).map_err(|e| SyncError::io(destination, e))?;
        report.directories_created += 1;
    }

    let entries = fs::read_dir(source).map_err(|e| SyncError::io(source, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::io(source, e))?;
        let entry_path = entry.path();
        let target = destination.join(entry.file_name());

        // Directory symlinks are never followed
        let file_type = entry.file_type().map_err(|e| SyncError::io(&entry_path, e))?;
        if file_type.is_dir() {
            merge_dir(&entry_path, &target, report)?;
        } else if file_type.is_symlink() && !entry_path.is_file() {
            warn!("Skipping symlink {}", entry_path.display());
        } else {
            copy_file(&entry_path, &target, report)?;
        }
    }

    Ok(())
}

/// Copy one file, replacing the target unconditionally and keeping the source mtime
fn copy_file(source: &Path, target: &Path, report: &mut MergeReport) -> Result<()> {
    let existed = target.exists();

    fs::copy(source, target).map_err(|e| SyncError::io(target, e))?;
    let metadata = fs::metadata(source).map_err(|e| SyncError::io(source, e))?;
    set_file_mtime(target, FileTime::from_last_modification_time(&metadata))
        .map_err(|e| SyncError::io(target, e))?;

    if existed {
        report.files_overwritten += 1;
    } else {
        report.files_copied += 1;
    }
    debug!("Copied {} -> {}", source.display(), target.display());
    Ok(())
}

/// Copy a line-oriented `key=value` file, forcing `key` to `value`
///
/// Returns [`SyncError::SourceMissing`] when `source` does not exist.
pub fn copy_with_flag(source: &Path, destination: &Path, key: &str, value: &str) -> Result<()> {
    if !source.is_file() {
        return Err(SyncError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    let content = fs::read_to_string(source).map_err(|e| SyncError::io(source, e))?;
    let rewritten = rewrite_flag(&content, key, value)?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    fs::write(destination, rewritten).map_err(|e| SyncError::io(destination, e))?;

    info!("Wrote {} with {}={}", destination.display(), key, value);
    Ok(())
}

/// Set `key` to `value` in line-oriented `key=value` content
///
/// Every line whose key is `key` becomes `key=value` with its original line
/// terminator; all other lines are returned byte-for-byte. If no line carries
/// the key, `key=value` is appended.
pub fn rewrite_flag(content: &str, key: &str, value: &str) -> Result<String> {
    let pattern = Regex::new(&format!(r"^\s*{}\s*=", regex::escape(key)))
        .map_err(|e| SyncError::invalid_input(format!("invalid flag key {:?}: {}", key, e)))?;

    let mut output = String::with_capacity(content.len() + key.len() + value.len() + 2);
    let mut found = false;

    for line in content.split_inclusive('\n') {
        if pattern.is_match(line) {
            found = true;
            let terminator = if line.ends_with("\r\n") {
                "\r\n"
            } else if line.ends_with('\n') {
                "\n"
            } else {
                ""
            };
            output.push_str(key);
            output.push('=');
            output.push_str(value);
            output.push_str(terminator);
        } else {
            output.push_str(line);
        }
    }

    if !found {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(key);
        output.push('=');
        output.push_str(value);
        output.push('\n');
    }

    Ok(output)
}
