//! Placeholder name stripping
//!
//! Template files ship as `config.EXAMPLE.ini` or `profile_EXAMPLE`. After a
//! refresh the markers are removed to activate them.
//!
//! Invariant: an entry is renamed only after everything below it has been
//! processed. Renaming a directory changes the path of all its descendants,
//! so visiting children first keeps every not-yet-visited path valid.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// A rename performed by [`strip_placeholders`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Remove every marker substring from a single file name
pub fn strip_markers(name: &str, markers: &[String]) -> String {
    markers
        .iter()
        .fold(name.to_string(), |acc, marker| acc.replace(marker.as_str(), ""))
}

/// Strip `markers` from every entry name below `root`, children before parents
///
/// `root` itself is never renamed. A missing `root` yields no renames. When
/// the stripped name already exists the entry is left as is.
pub fn strip_placeholders(root: &Path, markers: &[String]) -> Result<Vec<Rename>> {
    let mut renames = Vec::new();
    if !root.is_dir() {
        debug!("Skipping placeholder pass, {} does not exist", root.display());
        return Ok(renames);
    }

    strip_dir(root, markers, &mut renames)?;
    Ok(renames)
}

fn strip_dir(dir: &Path, markers: &[String], renames: &mut Vec<Rename>) -> Result<()> {
    // Collect first: the directory is modified while we walk it
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| SyncError::io(entry.path(), e))?;
        entries.push((entry.path(), entry.file_name(), file_type.is_dir()));
    }

    for (path, name, is_dir) in entries {
        if is_dir {
            strip_dir(&path, markers, renames)?;
        }

        let Some(name) = name.to_str() else {
            continue;
        };
        let stripped = strip_markers(name, markers);
        if stripped == name {
            continue;
        }
        if stripped.is_empty() {
            warn!("Not renaming {}: name would be empty", path.display());
            continue;
        }

        let target = dir.join(&stripped);
        if target.exists() {
            warn!(
                "Not renaming {}: {} already exists",
                path.display(),
                target.display()
            );
            continue;
        }

        fs::rename(&path, &target).map_err(|e| SyncError::io(&path, e))?;
        debug!("Renamed {} -> {}", path.display(), target.display());
        renames.push(Rename {
            from: path,
            to: target,
        });
    }

    Ok(())
}
