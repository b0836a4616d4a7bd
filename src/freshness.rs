//! Staleness policy for tracked directories
//!
//! A tracked directory is stale when it is missing or when its modification
//! time is further in the past than the retention window. A single stale
//! directory forces a refresh of the whole group.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Default retention window: seven days
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Freshness of a single tracked path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Path does not exist
    Missing,
    /// Path exists and is within the retention window
    Fresh { age: Duration },
    /// Path exists but is older than the retention window
    Expired { age: Duration },
    /// Path exists but its metadata could not be read
    Unreadable,
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Freshness::Fresh { .. })
    }
}

/// Pure predicate over filesystem modification times
#[derive(Debug, Clone, Copy)]
pub struct PathFreshness {
    window: Duration,
}

impl Default for PathFreshness {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl PathFreshness {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Classify `path` relative to the current time
    pub fn inspect(&self, path: &Path) -> Freshness {
        self.inspect_at(path, SystemTime::now())
    }

    /// Classify `path` relative to `now`
    ///
    /// A path exactly `window` old is still fresh; a modification time in the
    /// future counts as zero age.
    pub fn inspect_at(&self, path: &Path, now: SystemTime) -> Freshness {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Freshness::Missing,
            Err(e) => {
                debug!("Cannot read metadata of {}: {}", path.display(), e);
                return Freshness::Unreadable;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(_) => return Freshness::Unreadable,
        };

        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > self.window {
            Freshness::Expired { age }
        } else {
            Freshness::Fresh { age }
        }
    }

    /// Whether `path` is missing or older than the retention window
    pub fn is_stale(&self, path: &Path) -> bool {
        self.inspect(path).is_stale()
    }

    pub fn is_stale_at(&self, path: &Path, now: SystemTime) -> bool {
        self.inspect_at(path, now).is_stale()
    }

    /// True if any of `paths` is stale
    pub fn should_refresh<P: AsRef<Path>>(&self, paths: &[P]) -> bool {
        self.should_refresh_at(paths, SystemTime::now())
    }

    pub fn should_refresh_at<P: AsRef<Path>>(&self, paths: &[P], now: SystemTime) -> bool {
        paths.iter().any(|path| {
            let path = path.as_ref();
            let freshness = self.inspect_at(path, now);
            if freshness.is_stale() {
                debug!("Tracked path is stale: {} ({:?})", path.display(), freshness);
            }
            freshness.is_stale()
        })
    }

    /// Freshness of every path, in order
    pub fn report<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<(PathBuf, Freshness)> {
        let now = SystemTime::now();
        paths
            .iter()
            .map(|p| (p.as_ref().to_path_buf(), self.inspect_at(p.as_ref(), now)))
            .collect()
    }
}
