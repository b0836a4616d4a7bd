use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use emuprep::credentials::CredentialAction;
use emuprep::dll::{FileSelector, FixedSelector};
use emuprep::health::{CheckResult, HealthCheck};
use emuprep::prompt::TerminalPrompter;
use emuprep::sync::{BootstrapOutcome, Interaction, RefreshDecision, RefreshSummary};
use emuprep::{
    AppId, Config, DirectoryMerger, RunOptions, RunSummary, SyncOrchestrator, WorkspaceRoot,
};

#[derive(Parser)]
#[command(name = "emuprep")]
#[command(about = "Keep a Steam emulator workspace fresh and generate per-game settings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory (overrides the configured one)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (default)
    Run {
        /// Application id; prompted for when omitted
        #[arg(long)]
        app_id: Option<AppId>,

        /// Steam API DLL to patch; prompted for when omitted
        #[arg(long, conflicts_with = "skip_dll")]
        dll: Option<PathBuf>,

        /// Do not patch a DLL
        #[arg(long)]
        skip_dll: bool,

        /// Refresh even if the tracked directories are fresh
        #[arg(long)]
        force_refresh: bool,
    },

    /// Bootstrap and refresh the tracked directories only
    Refresh {
        /// Refresh even if the tracked directories are fresh
        #[arg(long)]
        force: bool,
    },

    /// Store the login and copy it where the config generator reads it
    Login,

    /// Merge one directory tree into another
    Merge {
        /// Directory to copy from
        source: PathBuf,

        /// Directory to merge into
        destination: PathBuf,
    },

    /// Workspace health check and diagnostics
    Doctor,

    /// Write the default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init writes the config file, so it must not require one
    if let Some(Commands::Init) = cli.command {
        init_logging(cli.verbose, "info")?;
        return cmd_init(cli.config.as_deref(), cli.workspace.as_deref());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting emuprep v{}", env!("CARGO_PKG_VERSION"));

    let workspace = match &cli.workspace {
        Some(dir) => WorkspaceRoot::new(dir)
            .with_context(|| format!("Invalid workspace path: {}", dir.display()))?,
        None => config.workspace_root()?,
    };
    let config = Arc::new(config);

    match cli.command.unwrap_or(Commands::Run {
        app_id: None,
        dll: None,
        skip_dll: false,
        force_refresh: false,
    }) {
        Commands::Run {
            app_id,
            dll,
            skip_dll,
            force_refresh,
        } => cmd_run(config, workspace, app_id, dll, skip_dll, force_refresh).await,
        Commands::Refresh { force } => cmd_refresh(config, workspace, force).await,
        Commands::Login => cmd_login(config, workspace),
        Commands::Merge {
            source,
            destination,
        } => cmd_merge(&source, &destination),
        Commands::Doctor => cmd_doctor(&config, &workspace),
        Commands::Init => cmd_init(cli.config.as_deref(), cli.workspace.as_deref()),
    }
}

/// Initialize logging from the verbosity flag and configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Run the full pipeline
async fn cmd_run(
    config: Arc<Config>,
    workspace: WorkspaceRoot,
    app_id: Option<AppId>,
    dll: Option<PathBuf>,
    skip_dll: bool,
    force_refresh: bool,
) -> Result<()> {
    workspace.ensure_exists()?;
    let orchestrator = SyncOrchestrator::with_system(config, workspace)?;

    let prompter = TerminalPrompter;
    let fixed = FixedSelector(dll.clone());
    let dll_selector: Option<&dyn FileSelector> = match (skip_dll, dll) {
        (true, _) => None,
        (false, Some(_)) => Some(&fixed),
        (false, None) => Some(&prompter),
    };

    let interaction = Interaction {
        credentials: &prompter,
        app_id: &prompter,
        dll: dll_selector,
    };
    let options = RunOptions {
        app_id,
        force_refresh,
    };

    let summary = orchestrator.run(options, interaction).await?;
    print_run_summary(&summary);
    Ok(())
}

/// Bootstrap and refresh only
async fn cmd_refresh(config: Arc<Config>, workspace: WorkspaceRoot, force: bool) -> Result<()> {
    workspace.ensure_exists()?;
    let orchestrator = SyncOrchestrator::with_system(config, workspace)?;

    let (bootstrap, refresh) = orchestrator.prepare(force).await?;
    print_bootstrap(bootstrap);
    print_refresh(&refresh);
    Ok(())
}

/// Credential sync only
fn cmd_login(config: Arc<Config>, workspace: WorkspaceRoot) -> Result<()> {
    let orchestrator = SyncOrchestrator::with_system(config, workspace)?;
    let sync = orchestrator.sync_credentials(&TerminalPrompter)?;

    print_credentials(sync.action);
    println!("   👤 Username: {}", sync.credential.username);
    Ok(())
}

/// Merge two directories directly
fn cmd_merge(source: &Path, destination: &Path) -> Result<()> {
    let report = match DirectoryMerger::new().merge(source, destination) {
        Ok(report) => report,
        Err(e) if !e.is_fatal() => {
            warn!("{}", e);
            println!("⚠️  {}, nothing merged", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("✅ Merged {} into {}", source.display(), destination.display());
    println!("   📄 New files: {}", report.files_copied);
    println!("   🔄 Overwritten files: {}", report.files_overwritten);
    println!("   📁 Directories created: {}", report.directories_created);
    Ok(())
}

/// Workspace health check and diagnostics
fn cmd_doctor(config: &Config, workspace: &WorkspaceRoot) -> Result<()> {
    let health = HealthCheck::run(config, workspace);
    print_health_report(&health);

    if !health.all_passed() {
        anyhow::bail!("{} check(s) failed", health.errors().len());
    }
    Ok(())
}

/// Write the default configuration file
fn cmd_init(config_path: Option<&Path>, workspace: Option<&Path>) -> Result<()> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    if config_path.exists() {
        println!("⚠️  Configuration already exists: {}", config_path.display());
        return Ok(());
    }

    let mut config = Config::default();
    if let Some(dir) = workspace {
        let root = WorkspaceRoot::new(dir)
            .with_context(|| format!("Invalid workspace path: {}", dir.display()))?;
        config.workspace = root.path().display().to_string();
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    config.save(&config_path)?;

    println!("✅ emuprep initialized successfully!");
    println!("   Config: {}", config_path.display());
    println!("   Workspace: {}", config.workspace);
    println!("   Next: run 'emuprep doctor', then 'emuprep run'");
    Ok(())
}

fn print_bootstrap(outcome: BootstrapOutcome) {
    match outcome {
        BootstrapOutcome::AlreadyPresent => {}
        BootstrapOutcome::Extracted { downloaded: true } => {
            println!("📦 Asset bundle downloaded and extracted")
        }
        BootstrapOutcome::Extracted { downloaded: false } => {
            println!("📦 Asset bundle extracted")
        }
    }
}

fn print_refresh(decision: &RefreshDecision) {
    match decision {
        RefreshDecision::Skipped => println!("✅ Tracked directories are up to date"),
        RefreshDecision::Refreshed(summary) => print_refresh_summary(summary),
    }
}

fn print_refresh_summary(summary: &RefreshSummary) {
    println!("🔄 Refreshed tracked directories");
    println!("   🗑️  Removed: {}", summary.removed.len());
    for archive in &summary.archives {
        println!("   📥 {}", archive.display());
    }
    if !summary.auxiliary_removed.is_empty() {
        println!("   🧹 Auxiliary tools removed: {}", summary.auxiliary_removed.len());
    }
    println!("   ✏️  Placeholder renames: {}", summary.renames.len());
}

fn print_credentials(action: CredentialAction) {
    match action {
        CredentialAction::AlreadySynced => println!("🔑 Login already configured"),
        CredentialAction::Propagated => println!("🔑 Stored login copied for the config generator"),
        CredentialAction::Prompted => println!("🔑 Login saved"),
    }
}

fn print_run_summary(summary: &RunSummary) {
    println!();
    print_bootstrap(summary.bootstrap);
    print_refresh(&summary.refresh);
    print_credentials(summary.credentials);

    if summary.generated {
        println!("⚙️  Settings generated for appid {}", summary.app_id);
    } else {
        println!("⚠️  Config generator not found, nothing generated");
    }

    match &summary.merge.report {
        Some(report) => println!(
            "📁 Settings merged: {} new, {} overwritten",
            report.files_copied, report.files_overwritten
        ),
        None => println!("⏭️  No generated settings to merge"),
    }
    if summary.merge.overlay_applied {
        println!("🎮 Overlay enabled");
    }

    if let Some(dll) = &summary.dll {
        println!("🧩 DLL patched: {}", dll.renamed_to.display());
    }

    println!("\n🎉 Done!");
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 emuprep Workspace Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
