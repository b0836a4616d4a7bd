//! Error taxonomy for the synchronization pipeline
//!
//! Every pipeline stage returns [`SyncError`]. Only [`SyncError::SourceMissing`]
//! is recoverable: the orchestrator logs it and carries on. Everything else
//! aborts the run.

use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while preparing the workspace
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Download of {url} failed with HTTP status {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Extraction tool {} is not available: {reason}", .tool.display())]
    ExtractorMissing { tool: PathBuf, reason: String },

    #[error("Extraction of {} failed (exit code {code:?}): {stderr}", .archive.display())]
    ExtractionFailed {
        archive: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Required file not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Merge source not found: {}", .path.display())]
    SourceMissing { path: PathBuf },

    #[error("Credential file {} could not be accessed: {source}", .path.display())]
    CredentialIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with code {code:?}: {stderr}", .program.display())]
    SubprocessFailed {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn credential_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CredentialIo {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether this error must abort the pipeline
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::SourceMissing { .. })
    }
}
