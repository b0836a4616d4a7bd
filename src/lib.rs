//! emuprep - Workspace preparation for a Steam emulator toolchain
//!
//! emuprep keeps a folder of emulator releases and config tooling current,
//! then generates and merges per-game settings into the emulator folder.
//!
//! ## Core Features
//!
//! - **Freshness Policy**: tracked directories are re-downloaded once older than the retention window
//! - **Archive Bootstrap**: the extraction tool is fetched on first use
//! - **Settings Merge**: generator output is merged without deleting existing settings
//! - **Login Reuse**: a stored login is copied where the generator expects it
//! - **Configuration Management**: YAML-based configuration with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`sync`]: The pipeline state machine
//! - [`freshness`], [`fetch`], [`extract`], [`merge`], [`placeholder`]: pipeline stages
//! - [`credentials`], [`dll`], [`prompt`]: user-facing steps

pub mod config;
pub mod credentials;
pub mod dll;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod freshness;
pub mod health;
pub mod merge;
pub mod placeholder;
pub mod process;
pub mod prompt;
pub mod sync;
pub mod workspace;

pub use config::Config;
pub use error::{Result, SyncError};
pub use merge::{DirectoryMerger, MergeReport};
pub use sync::{AppId, RunOptions, RunSummary, SyncOrchestrator, SyncState};
pub use workspace::WorkspaceRoot;
