use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workspace::WorkspaceRoot;

/// Main configuration structure for emuprep
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory that holds the emulator, tools and downloaded archives
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Remote archives refreshed on the staleness policy
    #[serde(default)]
    pub sources: SourcesConfig,

    /// External decompression tool
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Base asset bundle and emulator folder
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Refresh policy
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Login file locations
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Config generator invocation and output layout
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Overlay flag toggle applied after merging
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Interface generators used when patching DLLs
    #[serde(default)]
    pub interfaces: InterfacesConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Subprocess settings
    #[serde(default)]
    pub process: ProcessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote archive configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Base URL the archive file names are appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Archive file names fetched on every refresh
    #[serde(default = "default_archives")]
    pub archives: Vec<String>,
}

/// Decompression tool configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractorConfig {
    /// Tool location, relative to the workspace
    #[serde(default = "default_extractor_executable")]
    pub executable: String,

    /// Where to download the tool from when it is missing
    #[serde(default = "default_extractor_url")]
    pub url: String,
}

/// Asset bundle configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssetsConfig {
    /// Archive kept on disk after extraction
    #[serde(default = "default_assets_bundle")]
    pub bundle: String,

    /// Optional download location for the bundle
    #[serde(default)]
    pub url: Option<String>,

    /// Emulator folder produced by the bundle
    #[serde(default = "default_emu_dir")]
    pub emu_dir: String,
}

/// Refresh policy configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefreshConfig {
    /// Retention window ("7d", "12h", "30m", ...)
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Directories whose age decides whether to refresh
    #[serde(default = "default_tracked_directories")]
    pub tracked_directories: Vec<String>,

    /// Directories left over from extraction that are not needed at runtime
    #[serde(default = "default_auxiliary_directories")]
    pub auxiliary_directories: Vec<String>,

    /// Name markers stripped from template files after a refresh
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,
}

/// Credential file locations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialsConfig {
    /// Canonical login file
    #[serde(default = "default_primary_login")]
    pub primary: String,

    /// Copy consumed by the config generator
    #[serde(default = "default_secondary_login")]
    pub secondary: String,
}

/// Config generator configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_executable")]
    pub executable: String,

    /// Scratch directory the generator writes into, keyed by app id
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Settings directory name, both in the scratch output and the emulator folder
    #[serde(default = "default_settings_dir")]
    pub settings_dir: String,
}

/// Overlay flag toggle configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverlayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Template overlay file, relative to the workspace
    #[serde(default = "default_overlay_source")]
    pub source: String,

    #[serde(default = "default_overlay_key")]
    pub key: String,

    #[serde(default = "default_overlay_value")]
    pub value: String,
}

/// Interface generator locations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InterfacesConfig {
    #[serde(default = "default_interfaces_x32")]
    pub x32: String,

    #[serde(default = "default_interfaces_x64")]
    pub x64: String,
}

/// Network configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// Request timeout in seconds, 0 disables it
    #[serde(default = "default_network_timeout")]
    pub timeout: u64,
}

/// Subprocess configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProcessConfig {
    /// Subprocess timeout in seconds, 0 disables it
    #[serde(default)]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_workspace() -> String {
    ".".to_string()
}
fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    "https://github.com/Detanup01/gbe_fork/releases/latest/download/".to_string()
}
fn default_archives() -> Vec<String> {
    vec![
        "emu-win-release.7z".to_string(),
        "generate_emu_config-win.7z".to_string(),
    ]
}
fn default_extractor_executable() -> String {
    "7zr.exe".to_string()
}
fn default_extractor_url() -> String {
    "https://github.com/ip7z/7zip/releases/latest/download/7zr.exe".to_string()
}
fn default_assets_bundle() -> String {
    "assets.7z".to_string()
}
fn default_emu_dir() -> String {
    "Emu".to_string()
}
fn default_retention() -> String {
    "7d".to_string()
}
fn default_tracked_directories() -> Vec<String> {
    vec!["generate_emu_config".to_string(), "release".to_string()]
}
fn default_auxiliary_directories() -> Vec<String> {
    vec![
        "parse_controller_vdf".to_string(),
        "parse_achievements_schema".to_string(),
    ]
}
fn default_placeholder_markers() -> Vec<String> {
    vec![".EXAMPLE".to_string(), "_EXAMPLE".to_string()]
}
fn default_primary_login() -> String {
    "my_login.txt".to_string()
}
fn default_secondary_login() -> String {
    "generate_emu_config/my_login.txt".to_string()
}
fn default_generator_executable() -> String {
    "generate_emu_config/generate_emu_config.exe".to_string()
}
fn default_output_dir() -> String {
    "output".to_string()
}
fn default_settings_dir() -> String {
    "steam_settings".to_string()
}
fn default_overlay_source() -> String {
    "release/steam_settings/configs.overlay.ini".to_string()
}
fn default_overlay_key() -> String {
    "enable_experimental_overlay".to_string()
}
fn default_overlay_value() -> String {
    "1".to_string()
}
fn default_interfaces_x32() -> String {
    "release/tools/generate_interfaces/generate_interfaces_x32.exe".to_string()
}
fn default_interfaces_x64() -> String {
    "release/tools/generate_interfaces/generate_interfaces_x64.exe".to_string()
}
fn default_network_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            archives: default_archives(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            executable: default_extractor_executable(),
            url: default_extractor_url(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            bundle: default_assets_bundle(),
            url: None,
            emu_dir: default_emu_dir(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            tracked_directories: default_tracked_directories(),
            auxiliary_directories: default_auxiliary_directories(),
            placeholder_markers: default_placeholder_markers(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_login(),
            secondary: default_secondary_login(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            executable: default_generator_executable(),
            output_dir: default_output_dir(),
            settings_dir: default_settings_dir(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            source: default_overlay_source(),
            key: default_overlay_key(),
            value: default_overlay_value(),
        }
    }
}

impl Default for InterfacesConfig {
    fn default() -> Self {
        Self {
            x32: default_interfaces_x32(),
            x64: default_interfaces_x64(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_network_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("emuprep").join("config.yml"))
    }

    /// Expand environment variables and `~` in the workspace path
    pub fn expand_paths(&mut self) -> Result<()> {
        self.workspace = shellexpand::full(&self.workspace)
            .context("Failed to expand workspace path")?
            .into_owned();

        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        self.retention_window()?;

        if self.refresh.placeholder_markers.iter().any(|m| m.is_empty()) {
            anyhow::bail!("refresh.placeholder_markers must not contain empty markers");
        }
        if self.overlay.key.trim().is_empty() || self.overlay.key.contains('=') {
            anyhow::bail!("overlay.key must be a non-empty key without '='");
        }

        Ok(())
    }

    /// Resolve the configured workspace into a [`WorkspaceRoot`]
    pub fn workspace_root(&self) -> Result<WorkspaceRoot> {
        WorkspaceRoot::new(&self.workspace)
            .with_context(|| format!("Invalid workspace path: {}", self.workspace))
    }

    /// Parse the retention window
    pub fn retention_window(&self) -> Result<Duration> {
        parse_duration(&self.refresh.retention)
            .with_context(|| format!("Invalid refresh.retention: {}", self.refresh.retention))
    }

    /// Network timeout, `None` when disabled
    pub fn network_timeout(&self) -> Option<Duration> {
        (self.network.timeout > 0).then(|| Duration::from_secs(self.network.timeout))
    }

    /// Subprocess timeout, `None` when disabled
    pub fn process_timeout(&self) -> Option<Duration> {
        (self.process.timeout > 0).then(|| Duration::from_secs(self.process.timeout))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            sources: SourcesConfig::default(),
            extractor: ExtractorConfig::default(),
            assets: AssetsConfig::default(),
            refresh: RefreshConfig::default(),
            credentials: CredentialsConfig::default(),
            generator: GeneratorConfig::default(),
            overlay: OverlayConfig::default(),
            interfaces: InterfacesConfig::default(),
            network: NetworkConfig::default(),
            process: ProcessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse duration strings like "45s", "30m", "12h", "7d" or bare seconds
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let seconds = if let Some(value) = duration_str.strip_suffix('s') {
        value.trim().parse::<u64>().context("Invalid seconds value")?
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value
            .trim()
            .parse::<u64>()
            .map(|v| v * 60)
            .context("Invalid minutes value")?
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value
            .trim()
            .parse::<u64>()
            .map(|v| v * 3600)
            .context("Invalid hours value")?
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value
            .trim()
            .parse::<u64>()
            .map(|v| v * 86400)
            .context("Invalid days value")?
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30m', '12h', '7d'")?
    };

    Ok(Duration::from_secs(seconds))
}
