use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use super::CredentialRecord;
use crate::errors::DeployError;

/// Where credential records live between runs.
///
/// The session layer never writes files itself; whoever drives it hands a
/// rotated record to `persist`. Swap the implementation to change how
/// concurrent writers are serialized.
pub trait CredentialStore: Send + Sync {
    /// Location shown to the operator in diagnostics.
    fn location(&self) -> &Path;

    fn load(&self) -> Result<CredentialRecord, DeployError>;

    fn persist(&self, record: &CredentialRecord) -> Result<(), DeployError>;
}

/// Load and validate the credential file at `path`.
pub fn load(path: &Path) -> Result<CredentialRecord, DeployError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DeployError::MissingCredential {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(DeployError::InvalidCredential {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let record: CredentialRecord =
        serde_json::from_str(&raw).map_err(|e| DeployError::InvalidCredential {
            path: path.to_path_buf(),
            reason: format!("malformed JSON: {}", e),
        })?;

    record
        .validate()
        .map_err(|reason| DeployError::InvalidCredential {
            path: path.to_path_buf(),
            reason,
        })?;

    Ok(record)
}

/// Non-failing probe: does `path` hold a usable credential?
pub fn has_valid(path: &Path) -> bool {
    load(path).is_ok()
}

/// JSON file store. Writes go to a temp file in the same directory which
/// is then renamed over the target, under an exclusive lock on a sidecar
/// `<file>.lock`.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn write_atomic(&self, record: &CredentialRecord) -> io::Result<()> {
        let lock_file = fs::File::create(self.lock_path())?;
        lock_file.lock_exclusive()?;

        let result = (|| -> io::Result<()> {
            let mut tmp = NamedTempFile::new_in(self.parent_dir())?;
            serde_json::to_writer_pretty(&mut tmp, record).map_err(io::Error::from)?;
            tmp.write_all(b"\n")?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        })();

        let _ = lock_file.unlock();
        result
    }
}

impl CredentialStore for FileCredentialStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CredentialRecord, DeployError> {
        load(&self.path)
    }

    fn persist(&self, record: &CredentialRecord) -> Result<(), DeployError> {
        self.write_atomic(record)
            .map_err(|source| DeployError::CredentialWrite {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!(path = %self.path.display(), "persisted refreshed credential");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VALID: &str = r#"{
        "token": "ya29.old",
        "refresh_token": "1//refresh",
        "client_id": "id.apps.googleusercontent.com",
        "client_secret": "secret",
        "scopes": ["https://www.googleapis.com/auth/drive"],
        "expiry": "2026-10-19T12:00:00.000Z"
    }"#;

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, DeployError::MissingCredential { .. }));
        assert!(!has_valid(&path));
    }

    #[test]
    fn test_load_rejects_records_without_client_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");

        for body in [
            r#"{"token":"t","refresh_token":"r"}"#,
            r#"{"token":"t","client_id":"id"}"#,
            r#"{"token":"t","client_secret":"s"}"#,
            r#"{"token":"t","client_id":"","client_secret":"s"}"#,
        ] {
            fs::write(&path, body).unwrap();
            let err = load(&path).unwrap_err();
            assert!(
                matches!(err, DeployError::InvalidCredential { .. }),
                "expected InvalidCredential for {}",
                body
            );
            assert!(!has_valid(&path));
        }
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("malformed JSON"));
    }

    #[test]
    fn test_load_valid_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, VALID).unwrap();

        let record = load(&path).unwrap();
        assert_eq!(record.token, "ya29.old");
        assert!(has_valid(&path));
        // loading never touches the file
        assert_eq!(fs::read_to_string(&path).unwrap(), VALID);
    }

    #[test]
    fn test_load_tolerates_bad_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"token":"t","refresh_token":"r","client_id":"id","client_secret":"s","expiry":"soon"}"#,
        )
        .unwrap();

        let record = load(&path).unwrap();
        assert_eq!(record.expiry, None);
        assert!(has_valid(&path));
    }

    #[test]
    fn test_persist_replaces_file_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, VALID).unwrap();

        let store = FileCredentialStore::new(&path);
        let record = store.load().unwrap();
        let updated = record.refreshed("ya29.new".into(), None, None);
        store.persist(&updated).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, updated);

        // only the credential file and its lock remain
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["token.json", "token.json.lock"]);
    }

    #[test]
    fn test_persist_failure_keeps_previous_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, VALID).unwrap();

        // target directory does not exist, so the temp file cannot be created
        let store = FileCredentialStore::new(dir.path().join("missing").join("token.json"));
        let record = load(&path).unwrap();
        let err = store.persist(&record).unwrap_err();
        assert!(matches!(err, DeployError::CredentialWrite { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), VALID);
    }
}
