//! Archive extraction through an external decompression tool
//!
//! The tool is bootstrapped lazily: the first extraction that finds it
//! missing downloads it. Archives are unpacked into the workspace root and
//! deleted afterwards, except for the persistent asset bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::fetch::Fetcher;
use crate::process::{ProcessCommand, ProcessRunner};
use crate::workspace::WorkspaceRoot;

/// Unpacks archives into the workspace
pub struct ArchiveExtractor {
    workspace: WorkspaceRoot,
    tool: PathBuf,
    tool_url: String,
    persistent_archive: String,
    fetcher: Arc<dyn Fetcher>,
    runner: Arc<dyn ProcessRunner>,
}

impl ArchiveExtractor {
    pub fn new(
        workspace: WorkspaceRoot,
        tool: impl AsRef<Path>,
        tool_url: impl Into<String>,
        persistent_archive: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let tool = workspace.resolve(tool);
        Self {
            workspace,
            tool,
            tool_url: tool_url.into(),
            persistent_archive: persistent_archive.into(),
            fetcher,
            runner,
        }
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool
    }

    /// Make sure the decompression tool is present, downloading it if needed
    pub async fn ensure_tool(&self) -> Result<()> {
        if self.tool.is_file() {
            return Ok(());
        }

        info!("Extraction tool missing, downloading {}", self.tool_url);
        if let Err(e) = self.fetcher.fetch(&self.tool_url, &self.tool).await {
            return Err(SyncError::ExtractorMissing {
                tool: self.tool.clone(),
                reason: e.to_string(),
            });
        }

        if !self.tool.is_file() {
            return Err(SyncError::ExtractorMissing {
                tool: self.tool.clone(),
                reason: "download did not produce the executable".to_string(),
            });
        }

        mark_executable(&self.tool)?;
        Ok(())
    }

    /// Unpack `archive` into the workspace root
    ///
    /// Unless `archive` is the persistent asset bundle it is deleted once the
    /// extraction succeeded.
    pub async fn extract(&self, archive: &Path) -> Result<()> {
        let archive = self.workspace.resolve(archive);

        self.ensure_tool().await?;

        if !archive.is_file() {
            return Err(SyncError::SourceNotFound { path: archive });
        }

        let output_arg = format!("-o{}", self.workspace.path().display());
        let command = ProcessCommand::new(&self.tool, self.workspace.path())
            .arg("x")
            .arg(archive.as_os_str())
            .arg(output_arg)
            .arg("-y");

        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(SyncError::ExtractionFailed {
                archive,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        info!("Extraction complete: {}", archive.display());

        if self.is_persistent(&archive) {
            debug!("Keeping persistent archive {}", archive.display());
        } else {
            std::fs::remove_file(&archive).map_err(|e| SyncError::io(&archive, e))?;
            debug!("Removed archive {}", archive.display());
        }

        Ok(())
    }

    /// Delete the bootstrapped tool; it is not needed at runtime
    pub fn remove_tool(&self) -> Result<bool> {
        match std::fs::remove_file(&self.tool) {
            Ok(()) => {
                info!("Removed {}", self.tool.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!("Failed to remove {}: {}", self.tool.display(), e);
                Err(SyncError::io(&self.tool, e))
            }
        }
    }

    fn is_persistent(&self, archive: &Path) -> bool {
        archive
            .file_name()
            .map(|name| name == self.persistent_archive.as_str())
            .unwrap_or(false)
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)
        .map_err(|e| SyncError::io(path, e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions).map_err(|e| SyncError::io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
