//! Archive downloads
//!
//! [`HttpFetcher`] streams a response body to disk in bounded chunks. The body
//! goes to `<destination>.part` first and is renamed into place only once the
//! download completed, so an interrupted transfer never leaves a truncated
//! archive behind under the real name.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Write buffer size for downloaded bodies
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Retrieves a remote resource to a local path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` to `destination`, returning the number of bytes written
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Streaming HTTP(S) fetcher backed by reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with an optional whole-request timeout
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| SyncError::Http {
            url: String::new(),
            source: e,
        })?;

        Ok(Self { client })
    }

    async fn download(&self, url: &str, partial: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Http {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::FetchFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = File::create(partial)
            .await
            .map_err(|e| SyncError::io(partial, e))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(|e| SyncError::Http {
            url: url.to_string(),
            source: e,
        })? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| SyncError::io(partial, e))?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(|e| SyncError::io(partial, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| SyncError::io(partial, e))?;

        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        info!("Downloading {} -> {}", url, destination.display());

        let partial = partial_path(destination);
        match self.download(url, &partial).await {
            Ok(written) => {
                tokio::fs::rename(&partial, destination)
                    .await
                    .map_err(|e| SyncError::io(destination, e))?;
                info!("Download complete: {} ({} bytes)", destination.display(), written);
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", partial.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}

/// Join a base URL and a file name with exactly one separating slash
pub fn join_url(base_url: &str, file_name: &str) -> String {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        file_name.trim_start_matches('/')
    );
    debug!("Resolved download URL: {}", url);
    url
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
