//! Steam API DLL patching
//!
//! The selected DLL is copied into the emulator folder, its interfaces are
//! dumped with the matching interface generator, and the copy is renamed to
//! `<stem>_o.dll` so the emulator's own DLL can take its place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::process::{run_checked, ProcessCommand, ProcessRunner};
use crate::workspace::WorkspaceRoot;

/// Locates the DLL to patch
pub trait FileSelector {
    /// Returns `None` when the user cancelled the selection
    fn select_dll(&self) -> Result<Option<PathBuf>>;
}

/// Always returns the same path; used for `--dll` on the command line
#[derive(Debug, Clone)]
pub struct FixedSelector(pub Option<PathBuf>);

impl FileSelector for FixedSelector {
    fn select_dll(&self) -> Result<Option<PathBuf>> {
        Ok(self.0.clone())
    }
}

/// Which interface generator a DLL needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DllArch {
    X32,
    X64,
}

impl DllArch {
    /// Architecture of a known Steam API DLL name
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "steam_api.dll" => Some(DllArch::X32),
            "steam_api64.dll" => Some(DllArch::X64),
            _ => None,
        }
    }
}

/// Result of a successful patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DllPatchOutcome {
    /// Final location of the renamed original DLL
    pub renamed_to: PathBuf,
    /// Interface generator that was run, if the DLL name was recognised
    pub arch: Option<DllArch>,
}

/// Copies, inspects and renames a game's Steam API DLL
pub struct DllPatcher {
    workspace: WorkspaceRoot,
    emu_dir: PathBuf,
    generator_x32: PathBuf,
    generator_x64: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl DllPatcher {
    pub fn new(
        workspace: WorkspaceRoot,
        emu_dir: impl AsRef<Path>,
        generator_x32: impl AsRef<Path>,
        generator_x64: impl AsRef<Path>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            emu_dir: workspace.resolve(emu_dir),
            generator_x32: workspace.resolve(generator_x32),
            generator_x64: workspace.resolve(generator_x64),
            workspace,
            runner,
        }
    }

    pub async fn patch(&self, selected: &Path) -> Result<DllPatchOutcome> {
        let file_name = selected
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| n.to_ascii_lowercase().ends_with(".dll"))
            .ok_or_else(|| {
                SyncError::invalid_input(format!("{} is not a DLL file", selected.display()))
            })?
            .to_string();

        if !selected.is_file() {
            return Err(SyncError::SourceNotFound {
                path: selected.to_path_buf(),
            });
        }

        std::fs::create_dir_all(&self.emu_dir).map_err(|e| SyncError::io(&self.emu_dir, e))?;
        let copied = self.emu_dir.join(&file_name);
        if is_same_file(selected, &copied)? {
            return Err(SyncError::invalid_input(format!(
                "{} is already in the emulator folder; select the game's copy",
                selected.display()
            )));
        }
        std::fs::copy(selected, &copied).map_err(|e| SyncError::io(&copied, e))?;
        info!("Copied {} -> {}", selected.display(), copied.display());

        let arch = DllArch::from_file_name(&file_name);
        if let Some(arch) = arch {
            let generator = match arch {
                DllArch::X32 => &self.generator_x32,
                DllArch::X64 => &self.generator_x64,
            };
            let command =
                ProcessCommand::new(generator, self.workspace.path()).arg(copied.as_os_str());
            run_checked(self.runner.as_ref(), &command).await?;
        }

        let renamed_to = original_name(&copied);
        if renamed_to.exists() {
            std::fs::remove_file(&renamed_to).map_err(|e| SyncError::io(&renamed_to, e))?;
        }
        std::fs::rename(&copied, &renamed_to).map_err(|e| SyncError::io(&copied, e))?;
        info!("Renamed to {}", renamed_to.display());

        Ok(DllPatchOutcome { renamed_to, arch })
    }
}

/// Copying a file onto itself truncates it
fn is_same_file(a: &Path, b: &Path) -> Result<bool> {
    if !b.exists() {
        return Ok(false);
    }
    let a = a.canonicalize().map_err(|e| SyncError::io(a, e))?;
    let b = b.canonicalize().map_err(|e| SyncError::io(b, e))?;
    Ok(a == b)
}

/// `steam_api64.dll` -> `steam_api64_o.dll`
fn original_name(dll: &Path) -> PathBuf {
    let stem = dll
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dll.with_file_name(format!("{}_o.dll", stem))
}
