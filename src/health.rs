//! Workspace health checks
//!
//! Preflight checks run by `emuprep doctor` to show what a run would have to
//! download, refresh or ask for.

use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::freshness::{Freshness, PathFreshness};
use crate::workspace::WorkspaceRoot;

/// Result of workspace health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Workspace directory status
    pub workspace: CheckResult,
    /// Emulator folder or asset bundle availability
    pub assets: CheckResult,
    /// Extraction tool (warning only, downloaded on demand)
    pub extractor: CheckResult,
    /// Tracked directory freshness (warning only)
    pub freshness: CheckResult,
    /// Stored login (warning only)
    pub credentials: CheckResult,
    /// Config generator (warning only)
    pub generator: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config, workspace: &WorkspaceRoot) -> Self {
        Self {
            workspace: Self::check_workspace(workspace),
            assets: Self::check_assets(config, workspace),
            extractor: Self::check_extractor(config, workspace),
            freshness: Self::check_freshness(config, workspace),
            credentials: Self::check_credentials(config, workspace),
            generator: Self::check_generator(config, workspace),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.workspace.passed && self.assets.passed
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    fn check_workspace(workspace: &WorkspaceRoot) -> CheckResult {
        let path = workspace.path();
        if path.is_dir() {
            CheckResult::ok_with_details("Workspace exists", path.display().to_string())
        } else {
            CheckResult::error_with_details(
                "Workspace does not exist",
                format!("Run: mkdir -p {}", path.display()),
            )
        }
    }

    fn check_assets(config: &Config, workspace: &WorkspaceRoot) -> CheckResult {
        let emu_dir = workspace.resolve(&config.assets.emu_dir);
        let bundle = workspace.resolve(&config.assets.bundle);

        if emu_dir.is_dir() {
            CheckResult::ok_with_details("Emulator folder present", emu_dir.display().to_string())
        } else if bundle.is_file() {
            CheckResult::warning_with_details(
                "Emulator folder missing",
                format!("Will be extracted from {}", bundle.display()),
            )
        } else if let Some(url) = &config.assets.url {
            CheckResult::warning_with_details(
                "Emulator folder and asset bundle missing",
                format!("Bundle will be downloaded from {}", url),
            )
        } else {
            CheckResult::error_with_details(
                "Emulator folder and asset bundle missing",
                format!("Place {} in the workspace or set assets.url", config.assets.bundle),
            )
        }
    }

    fn check_extractor(config: &Config, workspace: &WorkspaceRoot) -> CheckResult {
        let tool = workspace.resolve(&config.extractor.executable);
        if tool.is_file() {
            CheckResult::ok_with_details("Extraction tool present", tool.display().to_string())
        } else {
            CheckResult::warning_with_details(
                "Extraction tool not present",
                format!("Downloaded on demand from {}", config.extractor.url),
            )
        }
    }

    fn check_freshness(config: &Config, workspace: &WorkspaceRoot) -> CheckResult {
        let window = match config.retention_window() {
            Ok(window) => window,
            Err(e) => {
                return CheckResult::warning_with_details("Invalid retention", format!("{:#}", e))
            }
        };
        let tracked: Vec<_> = config
            .refresh
            .tracked_directories
            .iter()
            .map(|d| workspace.resolve(d))
            .collect();
        if tracked.is_empty() {
            return CheckResult::ok("No tracked directories configured");
        }

        let report = PathFreshness::new(window).report(&tracked);
        let details = report
            .iter()
            .map(|(path, freshness)| format!("{}: {}", path.display(), describe(path, freshness)))
            .collect::<Vec<_>>()
            .join("\n");

        if report.iter().any(|(_, f)| f.is_stale()) {
            CheckResult::warning_with_details("Tracked directories need a refresh", details)
        } else {
            CheckResult::ok_with_details("Tracked directories are up to date", details)
        }
    }

    fn check_credentials(config: &Config, workspace: &WorkspaceRoot) -> CheckResult {
        let store = CredentialStore::new(
            workspace.resolve(&config.credentials.primary),
            workspace.resolve(&config.credentials.secondary),
        );
        match store.is_synced() {
            Ok(true) => CheckResult::ok("Login stored"),
            Ok(false) if store.primary().is_file() => CheckResult::warning_with_details(
                "Login not yet copied for the config generator",
                format!("Will be copied to {}", store.secondary().display()),
            ),
            Ok(false) => CheckResult::warning_with_details(
                "No stored login",
                "You will be prompted. Run: emuprep login",
            ),
            Err(e) => CheckResult::warning_with_details("Login file unreadable", e.to_string()),
        }
    }

    fn check_generator(config: &Config, workspace: &WorkspaceRoot) -> CheckResult {
        let generator = workspace.resolve(&config.generator.executable);
        if generator.is_file() {
            CheckResult::ok_with_details("Config generator present", generator.display().to_string())
        } else {
            CheckResult::warning_with_details(
                "Config generator not found",
                format!("Expected at {}; appears after a refresh", generator.display()),
            )
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 6] {
        [
            ("Workspace", &self.workspace),
            ("Emulator Assets", &self.assets),
            ("Extraction Tool", &self.extractor),
            ("Freshness", &self.freshness),
            ("Login", &self.credentials),
            ("Config Generator", &self.generator),
        ]
    }
}

fn describe(path: &Path, freshness: &Freshness) -> String {
    match freshness {
        Freshness::Missing => "missing".to_string(),
        Freshness::Unreadable => "unreadable".to_string(),
        Freshness::Fresh { age } => format!("{} old{}", format_age(*age), modified_at(path)),
        Freshness::Expired { age } => {
            format!("{} old, expired{}", format_age(*age), modified_at(path))
        }
    }
}

fn modified_at(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| {
            let local: DateTime<Local> = modified.into();
            format!(" (updated {})", local.format("%Y-%m-%d %H:%M"))
        })
        .unwrap_or_default()
}

/// Human readable age, largest unit first
pub fn format_age(age: Duration) -> String {
    let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::weeks(52_000));
    if age.num_days() > 0 {
        format!("{}d {}h", age.num_days(), age.num_hours() % 24)
    } else if age.num_hours() > 0 {
        format!("{}h {}m", age.num_hours(), age.num_minutes() % 60)
    } else if age.num_minutes() > 0 {
        format!("{}m", age.num_minutes())
    } else {
        format!("{}s", age.num_seconds())
    }
}
