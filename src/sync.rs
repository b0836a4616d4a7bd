//! Sync Orchestrator - Drives the end-to-end workspace refresh
//!
//! The pipeline is a fixed sequence of states, each gated by the success of
//! the previous one:
//!
//! `Bootstrap -> CheckFreshness -> {Skip | Refresh} -> Credentials ->
//! GenerateConfig -> MergeGeneratedOutput -> PatchDll -> Done`
//!
//! Fetch and extraction failures abort the run. A missing merge source is
//! logged and the merge becomes a no-op.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::credentials::{CredentialAction, CredentialPrompter, CredentialStore, CredentialSync};
use crate::dll::{DllPatchOutcome, DllPatcher, FileSelector};
use crate::error::{Result, SyncError};
use crate::extract::ArchiveExtractor;
use crate::fetch::{join_url, Fetcher, HttpFetcher};
use crate::freshness::PathFreshness;
use crate::merge::{copy_with_flag, DirectoryMerger, MergeReport};
use crate::placeholder::{strip_placeholders, Rename};
use crate::process::{run_checked, ProcessCommand, ProcessRunner, SystemProcessRunner};
use crate::workspace::WorkspaceRoot;

/// Numeric application identifier passed to the config generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(u32);

impl AppId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(SyncError::invalid_input(format!(
                "appid must be numeric, got {:?}",
                s
            )));
        }
        trimmed
            .parse::<u32>()
            .map(AppId)
            .map_err(|e| SyncError::invalid_input(format!("appid {:?} is out of range: {}", s, e)))
    }
}

/// Source of the application id when none was given up front
pub trait AppIdPrompter {
    fn prompt_app_id(&self) -> Result<AppId>;
}

/// Pipeline states, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Bootstrap,
    CheckFreshness,
    Skip,
    Refresh,
    Credentials,
    GenerateConfig,
    MergeGeneratedOutput,
    PatchDll,
    Done,
}

/// What the bootstrap stage had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Emulator folder already present
    AlreadyPresent,
    /// Asset bundle was extracted; `downloaded` when it had to be fetched first
    Extracted { downloaded: bool },
}

/// Everything a refresh changed
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    /// Tracked directories deleted before fetching
    pub removed: Vec<PathBuf>,
    /// Archives fetched and extracted
    pub archives: Vec<PathBuf>,
    /// Auxiliary tools deleted after extraction
    pub auxiliary_removed: Vec<PathBuf>,
    /// Placeholder renames
    pub renames: Vec<Rename>,
}

/// Result of the freshness check
#[derive(Debug, Clone)]
pub enum RefreshDecision {
    Skipped,
    Refreshed(RefreshSummary),
}

impl RefreshDecision {
    pub fn refreshed(&self) -> bool {
        matches!(self, RefreshDecision::Refreshed(_))
    }
}

/// Result of folding generated output into the settings tree
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// `None` when the generator produced no settings for this app
    pub report: Option<MergeReport>,
    pub overlay_applied: bool,
    pub scratch_removed: bool,
}

/// Options for a full run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Application id; prompted for when absent
    pub app_id: Option<AppId>,
    /// Refresh even if every tracked directory is fresh
    pub force_refresh: bool,
}

/// Interactive collaborators used by a full run
pub struct Interaction<'a> {
    pub credentials: &'a dyn CredentialPrompter,
    pub app_id: &'a dyn AppIdPrompter,
    /// `None` skips DLL patching
    pub dll: Option<&'a dyn FileSelector>,
}

/// Results from a complete run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub states: Vec<SyncState>,
    pub bootstrap: BootstrapOutcome,
    pub refresh: RefreshDecision,
    pub credentials: CredentialAction,
    pub app_id: AppId,
    pub generated: bool,
    pub merge: MergeOutcome,
    pub dll: Option<DllPatchOutcome>,
    pub duration: Duration,
}

/// Composes fetching, extraction, merging and credential reuse
pub struct SyncOrchestrator {
    config: Arc<Config>,
    workspace: WorkspaceRoot,
    fetcher: Arc<dyn Fetcher>,
    runner: Arc<dyn ProcessRunner>,
    extractor: ArchiveExtractor,
    freshness: PathFreshness,
    merger: DirectoryMerger,
}

impl SyncOrchestrator {
    /// Create an orchestrator with explicit collaborators
    pub fn new(
        config: Arc<Config>,
        workspace: WorkspaceRoot,
        fetcher: Arc<dyn Fetcher>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let window = config
            .retention_window()
            .map_err(|e| SyncError::invalid_input(format!("{:#}", e)))?;

        let extractor = ArchiveExtractor::new(
            workspace.clone(),
            &config.extractor.executable,
            config.extractor.url.clone(),
            config.assets.bundle.clone(),
            fetcher.clone(),
            runner.clone(),
        );

        Ok(Self {
            config,
            workspace,
            fetcher,
            runner,
            extractor,
            freshness: PathFreshness::new(window),
            merger: DirectoryMerger::new(),
        })
    }

    /// Create an orchestrator that talks to the network and spawns real processes
    pub fn with_system(config: Arc<Config>, workspace: WorkspaceRoot) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.network_timeout())?);
        let runner = Arc::new(SystemProcessRunner::new(config.process_timeout()));
        Self::new(config, workspace, fetcher, runner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &WorkspaceRoot {
        &self.workspace
    }

    pub fn freshness(&self) -> &PathFreshness {
        &self.freshness
    }

    pub fn extractor(&self) -> &ArchiveExtractor {
        &self.extractor
    }

    /// Absolute paths of the tracked directories
    pub fn tracked_directories(&self) -> Vec<PathBuf> {
        self.resolve_all(&self.config.refresh.tracked_directories)
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(
            self.workspace.resolve(&self.config.credentials.primary),
            self.workspace.resolve(&self.config.credentials.secondary),
        )
    }

    pub fn dll_patcher(&self) -> DllPatcher {
        DllPatcher::new(
            self.workspace.clone(),
            &self.config.assets.emu_dir,
            &self.config.interfaces.x32,
            &self.config.interfaces.x64,
            self.runner.clone(),
        )
    }

    /// Make sure the emulator folder exists, extracting the asset bundle on first run
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        let emu_dir = self.workspace.resolve(&self.config.assets.emu_dir);
        if emu_dir.is_dir() {
            debug!("Emulator folder present: {}", emu_dir.display());
            return Ok(BootstrapOutcome::AlreadyPresent);
        }

        let bundle = self.workspace.resolve(&self.config.assets.bundle);
        let mut downloaded = false;
        if !bundle.is_file() {
            match &self.config.assets.url {
                Some(url) => {
                    info!("Asset bundle missing, downloading {}", url);
                    self.fetcher.fetch(url, &bundle).await?;
                    downloaded = true;
                }
                None => return Err(SyncError::SourceNotFound { path: bundle }),
            }
        }

        info!("First run: extracting {}", bundle.display());
        self.extractor.extract(&bundle).await?;
        self.extractor.remove_tool()?;

        Ok(BootstrapOutcome::Extracted { downloaded })
    }

    /// True if any tracked directory is missing or expired
    pub fn check_freshness(&self) -> bool {
        self.freshness.should_refresh(&self.tracked_directories())
    }

    /// Delete, re-download and re-extract everything the staleness policy covers
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        info!("Refreshing tracked directories...");
        let mut summary = RefreshSummary::default();

        for directory in self.tracked_directories() {
            if remove_path(&directory)? {
                summary.removed.push(directory);
            }
        }

        for archive in &self.config.sources.archives {
            let url = join_url(&self.config.sources.base_url, archive);
            let destination = self.workspace.resolve(archive);
            self.fetcher.fetch(&url, &destination).await?;
            self.extractor.extract(&destination).await?;
            summary.archives.push(destination);
        }

        self.extractor.remove_tool()?;
        for directory in self.resolve_all(&self.config.refresh.auxiliary_directories) {
            if remove_path(&directory)? {
                summary.auxiliary_removed.push(directory);
            }
        }

        for directory in self.tracked_directories() {
            let renames = strip_placeholders(&directory, &self.config.refresh.placeholder_markers)?;
            summary.renames.extend(renames);
        }

        info!(
            "Refresh complete: {} archives, {} placeholder renames",
            summary.archives.len(),
            summary.renames.len()
        );
        Ok(summary)
    }

    /// Refresh when forced or when any tracked directory is stale
    pub async fn refresh_if_needed(&self, force: bool) -> Result<RefreshDecision> {
        if force || self.check_freshness() {
            Ok(RefreshDecision::Refreshed(self.refresh().await?))
        } else {
            info!("Tracked directories are up to date");
            Ok(RefreshDecision::Skipped)
        }
    }

    pub fn sync_credentials(&self, prompter: &dyn CredentialPrompter) -> Result<CredentialSync> {
        self.credential_store().sync_credentials(prompter)
    }

    /// Run the config generator for `app_id`
    ///
    /// Returns `false` without running anything when the generator is not installed.
    pub async fn generate_config(&self, app_id: AppId) -> Result<bool> {
        let executable = self.workspace.resolve(&self.config.generator.executable);
        if !executable.is_file() {
            warn!("Config generator not found: {}", executable.display());
            return Ok(false);
        }

        let command =
            ProcessCommand::new(&executable, self.workspace.path()).arg(app_id.to_string());
        run_checked(self.runner.as_ref(), &command).await?;
        Ok(true)
    }

    /// Fold the generator's output into the emulator settings and discard the scratch directory
    pub fn merge_generated_output(&self, app_id: AppId) -> Result<MergeOutcome> {
        let generator = &self.config.generator;
        let scratch = self.workspace.resolve(&generator.output_dir);
        let source = scratch.join(app_id.to_string()).join(&generator.settings_dir);
        let destination = self
            .workspace
            .resolve(&self.config.assets.emu_dir)
            .join(&generator.settings_dir);

        let mut outcome = MergeOutcome::default();

        match self.merger.merge(&source, &destination) {
            Ok(report) => outcome.report = Some(report),
            Err(e) if !e.is_fatal() => warn!("{}; nothing merged", e),
            Err(e) => return Err(e),
        }

        if self.config.overlay.enabled {
            let overlay = &self.config.overlay;
            let template = self.workspace.resolve(&overlay.source);
            let target = match template.file_name() {
                Some(name) => destination.join(name),
                None => {
                    return Err(SyncError::invalid_input(format!(
                        "overlay.source has no file name: {}",
                        overlay.source
                    )))
                }
            };
            match copy_with_flag(&template, &target, &overlay.key, &overlay.value) {
                Ok(()) => outcome.overlay_applied = true,
                Err(e) if !e.is_fatal() => warn!("{}; overlay flag not applied", e),
                Err(e) => return Err(e),
            }
        }

        outcome.scratch_removed = remove_path(&scratch)?;
        Ok(outcome)
    }

    /// Let the user pick a DLL and patch it. Invalid selections are reported and skipped.
    pub async fn patch_dll(&self, selector: &dyn FileSelector) -> Result<Option<DllPatchOutcome>> {
        let Some(selected) = selector.select_dll()? else {
            info!("No DLL selected, skipping");
            return Ok(None);
        };

        match self.dll_patcher().patch(&selected).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e @ SyncError::InvalidInput { .. }) => {
                warn!("{}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Bootstrap and refresh only
    pub async fn prepare(&self, force: bool) -> Result<(BootstrapOutcome, RefreshDecision)> {
        let bootstrap = self.bootstrap().await?;
        let refresh = self.refresh_if_needed(force).await?;
        Ok((bootstrap, refresh))
    }

    /// Run the whole pipeline
    pub async fn run(&self, options: RunOptions, interaction: Interaction<'_>) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut states = Vec::new();

        enter(&mut states, SyncState::Bootstrap);
        let bootstrap = self.bootstrap().await?;

        enter(&mut states, SyncState::CheckFreshness);
        let refresh = if options.force_refresh || self.check_freshness() {
            enter(&mut states, SyncState::Refresh);
            RefreshDecision::Refreshed(self.refresh().await?)
        } else {
            enter(&mut states, SyncState::Skip);
            RefreshDecision::Skipped
        };

        enter(&mut states, SyncState::Credentials);
        let credentials = self.sync_credentials(interaction.credentials)?.action;

        enter(&mut states, SyncState::GenerateConfig);
        let app_id = match options.app_id {
            Some(app_id) => app_id,
            None => interaction.app_id.prompt_app_id()?,
        };
        let generated = self.generate_config(app_id).await?;

        enter(&mut states, SyncState::MergeGeneratedOutput);
        let merge = self.merge_generated_output(app_id)?;

        let dll = match interaction.dll {
            Some(selector) => {
                enter(&mut states, SyncState::PatchDll);
                self.patch_dll(selector).await?
            }
            None => None,
        };

        enter(&mut states, SyncState::Done);
        let duration = start_time.elapsed();
        info!("Run completed in {:.2}s", duration.as_secs_f64());

        Ok(RunSummary {
            states,
            bootstrap,
            refresh,
            credentials,
            app_id,
            generated,
            merge,
            dll,
            duration,
        })
    }

    fn resolve_all(&self, paths: &[String]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.workspace.resolve(p)).collect()
    }
}

fn enter(states: &mut Vec<SyncState>, state: SyncState) {
    debug!("Entering state {:?}", state);
    states.push(state);
}

/// Remove a file or directory tree; `false` if nothing was there
fn remove_path(path: &Path) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(SyncError::io(path, e)),
    };

    if metadata.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| SyncError::io(path, e))?;
    } else {
        std::fs::remove_file(path).map_err(|e| SyncError::io(path, e))?;
    }
    info!("Removed {}", path.display());
    Ok(true)
}
