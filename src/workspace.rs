//! Workspace root handling
//!
//! Every component resolves its relative paths against an explicit
//! [`WorkspaceRoot`] instead of the process working directory.

use path_clean::PathClean;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Absolute, lexically cleaned directory that all pipeline paths live under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Build a workspace root, making relative paths absolute against the current directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|e| SyncError::io(root, e))?;
            cwd.join(root)
        };

        Ok(Self {
            root: absolute.clean(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path. Absolute paths are returned unchanged.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative.as_ref()).clean()
    }

    /// Create the root directory if it does not exist yet
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| SyncError::io(&self.root, e))
    }
}
