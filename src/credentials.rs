//! Login reuse
//!
//! The canonical login lives in a primary file; the config generator reads a
//! copy at a secondary location. [`CredentialStore::sync_credentials`] keeps
//! the two byte-identical and only prompts when no primary copy exists.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Username and plaintext secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// File representation: two newline-terminated lines
    pub fn to_file_contents(&self) -> String {
        format!("{}\n{}\n", self.username, self.secret)
    }

    /// Parse the two-line file format. Returns `None` if either line is missing.
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let username = lines.next()?;
        let secret = lines.next()?;
        Some(Self::new(username, secret))
    }
}

/// Source of a fresh login when none is stored yet
pub trait CredentialPrompter {
    /// Ask for a username and a secret. The secret must not be echoed.
    fn prompt_credentials(&self) -> Result<Credential>;
}

/// What [`CredentialStore::sync_credentials`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialAction {
    /// Both copies were already identical
    AlreadySynced,
    /// Primary was copied over a missing or different secondary
    Propagated,
    /// Nothing was stored; the user was prompted
    Prompted,
}

/// Outcome of a credential sync
#[derive(Debug, Clone)]
pub struct CredentialSync {
    pub credential: Credential,
    pub action: CredentialAction,
}

/// Keeps the primary and secondary login files in sync
#[derive(Debug, Clone)]
pub struct CredentialStore {
    primary: PathBuf,
    secondary: PathBuf,
}

impl CredentialStore {
    pub fn new(primary: impl Into<PathBuf>, secondary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn secondary(&self) -> &Path {
        &self.secondary
    }

    /// Make sure both login files exist and match, prompting only if needed
    pub fn sync_credentials(&self, prompter: &dyn CredentialPrompter) -> Result<CredentialSync> {
        let primary = read_optional(&self.primary)?;

        let (credential, action) = match primary {
            Some(primary) => {
                // Validate before touching the secondary
                let credential = parse_bytes(&self.primary, &primary)?;
                let secondary = read_optional(&self.secondary)?;
                if secondary.as_deref() == Some(primary.as_slice()) {
                    info!("Login already configured, nothing to do");
                    (credential, CredentialAction::AlreadySynced)
                } else {
                    self.write_secondary(&primary)?;
                    info!("Login copied to {}", self.secondary.display());
                    (credential, CredentialAction::Propagated)
                }
            }
            None => {
                let credential = prompter.prompt_credentials()?;
                let contents = credential.to_file_contents().into_bytes();
                write_file(&self.primary, &contents)?;
                self.write_secondary(&contents)?;
                info!(
                    "Login saved to {} and copied to {}",
                    self.primary.display(),
                    self.secondary.display()
                );
                (credential, CredentialAction::Prompted)
            }
        };

        Ok(CredentialSync { credential, action })
    }

    /// Whether both files exist and are byte-identical
    pub fn is_synced(&self) -> Result<bool> {
        let primary = read_optional(&self.primary)?;
        let secondary = read_optional(&self.secondary)?;
        Ok(primary.is_some() && primary == secondary)
    }

    fn write_secondary(&self, contents: &[u8]) -> Result<()> {
        write_file(&self.secondary, contents)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::credential_io(path, e)),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::credential_io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| SyncError::credential_io(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn parse_bytes(path: &Path, bytes: &[u8]) -> Result<Credential> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        SyncError::credential_io(path, std::io::Error::new(ErrorKind::InvalidData, e))
    })?;
    Credential::parse(text).ok_or_else(|| {
        SyncError::credential_io(
            path,
            std::io::Error::new(ErrorKind::InvalidData, "expected a username and a secret line"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use filetime::{set_file_mtime, FileTime};
    use std::cell::Cell;
    use tempfile::TempDir;

    struct FixedPrompter {
        calls: Cell<usize>,
    }

    impl FixedPrompter {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl CredentialPrompter for FixedPrompter {
        fn prompt_credentials(&self) -> Result<Credential> {
            self.calls.set(self.calls.get() + 1);
            Ok(Credential::new("gaben", "hunter2"))
        }
    }

    fn store(temp_dir: &TempDir) -> CredentialStore {
        CredentialStore::new(
            temp_dir.path().join("my_login.txt"),
            temp_dir.path().join("generate_emu_config/my_login.txt"),
        )
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let rendered = format!("{:?}", Credential::new("gaben", "hunter2"));
        assert!(rendered.contains("gaben"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_credential_parse() {
        assert_eq!(
            Credential::parse("gaben\nhunter2\n"),
            Some(Credential::new("gaben", "hunter2"))
        );
        assert_eq!(
            Credential::parse("gaben\r\nhunter2\r\n"),
            Some(Credential::new("gaben", "hunter2"))
        );
        assert_eq!(Credential::parse("gaben\n"), None);
        assert_eq!(Credential::parse(""), None);
    }

    #[test]
    fn test_prompts_when_nothing_stored() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let prompter = FixedPrompter::new();

        let sync = store.sync_credentials(&prompter).unwrap();

        assert_eq!(sync.action, CredentialAction::Prompted);
        assert_eq!(sync.credential, Credential::new("gaben", "hunter2"));
        assert_eq!(prompter.calls.get(), 1);
        assert_eq!(fs::read_to_string(store.primary()).unwrap(), "gaben\nhunter2\n");
        assert_eq!(fs::read(store.primary()).unwrap(), fs::read(store.secondary()).unwrap());
    }

    #[test]
    fn test_propagates_primary_to_missing_secondary() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::write(store.primary(), "alice\ns3cret\n").unwrap();
        let prompter = FixedPrompter::new();

        let sync = store.sync_credentials(&prompter).unwrap();

        assert_eq!(sync.action, CredentialAction::Propagated);
        assert_eq!(prompter.calls.get(), 0);
        assert_eq!(fs::read(store.secondary()).unwrap(), b"alice\ns3cret\n");
    }

    #[test]
    fn test_overwrites_diverged_secondary_of_same_size() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::create_dir_all(store.secondary().parent().unwrap()).unwrap();
        fs::write(store.primary(), "alice\nnewpw1\n").unwrap();
        fs::write(store.secondary(), "alice\noldpw1\n").unwrap();

        let sync = store.sync_credentials(&FixedPrompter::new()).unwrap();

        assert_eq!(sync.action, CredentialAction::Propagated);
        assert_eq!(fs::read(store.secondary()).unwrap(), b"alice\nnewpw1\n");
    }

    #[test]
    fn test_identical_files_are_not_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::create_dir_all(store.secondary().parent().unwrap()).unwrap();
        fs::write(store.primary(), "alice\ns3cret\n").unwrap();
        fs::write(store.secondary(), "alice\ns3cret\n").unwrap();
        let old = FileTime::from_unix_time(1_500_000_000, 0);
        set_file_mtime(store.primary(), old).unwrap();
        set_file_mtime(store.secondary(), old).unwrap();

        let sync = store.sync_credentials(&FixedPrompter::new()).unwrap();

        assert_eq!(sync.action, CredentialAction::AlreadySynced);
        for path in [store.primary(), store.secondary()] {
            let metadata = fs::metadata(path).unwrap();
            assert_eq!(FileTime::from_last_modification_time(&metadata), old);
        }
    }

    #[test]
    fn test_malformed_primary_is_credential_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::create_dir_all(store.secondary().parent().unwrap()).unwrap();
        fs::write(store.primary(), "only-a-username\n").unwrap();
        fs::write(store.secondary(), "good\nsecret\n").unwrap();

        let err = store.sync_credentials(&FixedPrompter::new()).unwrap_err();
        assert_matches!(err, SyncError::CredentialIo { .. });
        assert_eq!(fs::read(store.secondary()).unwrap(), b"good\nsecret\n");
    }

    #[test]
    fn test_unreadable_primary_is_credential_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        // A directory where a file is expected cannot be read
        fs::create_dir(store.primary()).unwrap();

        let err = store.sync_credentials(&FixedPrompter::new()).unwrap_err();
        assert_matches!(err, SyncError::CredentialIo { .. });
        assert!(err.is_fatal());
    }

    #[test]
    fn test_is_synced() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        assert!(!store.is_synced().unwrap());

        store.sync_credentials(&FixedPrompter::new()).unwrap();
        assert!(store.is_synced().unwrap());
    }
}
