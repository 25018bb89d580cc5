use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Long-lived access token and its secret, as handed out by the token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub token_secret: String,
    pub obtained_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token)
            .field("token_secret", &"<secret>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Reads and writes the single credential file of this program.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential.
    ///
    /// A missing, unreadable or corrupt file is the normal first-run state and
    /// yields `None` rather than an error.
    pub fn read(&self) -> Option<Credential> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = ?self.path, error = %e, "No readable token file");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(credential) => Some(credential),
            Err(e) => {
                debug!(path = ?self.path, error = %e, "Ignoring unparsable token file");
                None
            }
        }
    }

    /// Replace the stored credential.
    ///
    /// The content goes to an owner-only temporary file in the same directory
    /// which is then renamed over the token file, so the token is never
    /// readable by anyone else, not even briefly.
    pub fn write(&self, credential: &Credential) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Store(format!("Failed to create directory {:?}: {}", parent, e))
        })?;

        let contents = serde_json::to_string_pretty(credential)
            .map_err(|e| AppError::Store(format!("Failed to serialize credential: {}", e)))?;

        let mut file = NamedTempFile::new_in(parent)
            .map_err(|e| AppError::Store(format!("Failed to create token file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| AppError::Store(format!("Failed to write token file: {}", e)))?;
        file.as_file()
            .sync_all()
            .map_err(|e| AppError::Store(format!("Failed to flush token file: {}", e)))?;
        file.persist(&self.path).map_err(|e| {
            AppError::Store(format!("Failed to replace {:?}: {}", self.path, e.error))
        })?;

        debug!(path = ?self.path, "Saved credential");
        Ok(())
    }

    /// Delete the token file, forcing the next run to authorize again.
    #[instrument(name = "Clearing stored credential", skip_all)]
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            debug!("No stored credential to clear");
            return Ok(());
        }

        fs::remove_file(&self.path)
            .map_err(|e| AppError::Store(format!("Failed to delete token file: {}", e)))?;
        info!(path = ?self.path, "Cleared stored credential");

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_helpers::mock_credential;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".logss.tok"));

        store.write(&mock_credential()).unwrap();

        assert_eq!(store.read(), Some(mock_credential()));
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".logss.tok");
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        CredentialStore::new(&path).write(&mock_credential()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_overwrites_previous_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".logss.tok"));
        store.write(&mock_credential()).unwrap();

        let replacement = Credential {
            token: "1/other".to_string(),
            ..mock_credential()
        };
        store.write(&replacement).unwrap();

        assert_eq!(store.read(), Some(replacement));
    }

    #[test]
    fn test_read_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nope.tok"));
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_read_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".logss.tok");
        fs::write(&path, "\u{80}not json at all").unwrap();

        assert_eq!(CredentialStore::new(&path).read(), None);
    }

    #[test]
    fn test_write_into_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let store = CredentialStore::new(blocker.join("sub").join(".logss.tok"));

        assert!(matches!(
            store.write(&mock_credential()),
            Err(AppError::Store(_))
        ));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".logss.tok"));
        store.write(&mock_credential()).unwrap();

        store.clear().unwrap();
        assert!(!store.path().exists());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", mock_credential());
        assert!(!rendered.contains("access-secret"));
    }
}
