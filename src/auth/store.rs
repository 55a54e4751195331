use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::Credential;

const CREDENTIAL_FILE_VERSION: u32 = 1;
const CREDENTIAL_FILE_NAME: &str = "credentials.json";

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Externally supplied override (e.g. `WORKDESK_TOKEN`).
    Override,
    /// The persisted credential file.
    File,
}

/// A credential together with its origin.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
}

/// Storage abstraction for the local user's single bearer credential.
pub trait CredentialStore: Send + Sync {
    /// Resolve the active credential. An override always wins over the file;
    /// the two are never merged.
    fn resolve(&self) -> Result<Option<ResolvedCredential>, AuthError>;

    /// Replace the persisted credential.
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;

    /// Delete the persisted credential. Overrides are untouched.
    fn clear(&self) -> Result<(), AuthError>;

    fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.resolve()?.map(|resolved| resolved.credential))
    }
}

/// Configuration for file-backed credential storage.
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    pub path: PathBuf,
}

impl CredentialStoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store the credential file inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CREDENTIAL_FILE_NAME),
        }
    }
}

/// File-backed credential store with an optional read-only override.
///
/// The file lives in a per-user directory created with mode `0700`; the file
/// itself is written atomically with mode `0600`.
///
/// # Example
/// ```no_run
/// use workdesk::auth::{Credential, CredentialStore, CredentialStoreConfig, FileCredentialStore};
///
/// let store = FileCredentialStore::new(CredentialStoreConfig::in_dir("/tmp/workdesk"));
/// store.save(&Credential::new("wd_abc123"))?;
/// assert!(store.load()?.is_some());
/// # Ok::<(), workdesk::auth::AuthError>(())
/// ```
#[derive(Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    override_token: Option<String>,
}

impl FileCredentialStore {
    pub fn new(config: CredentialStoreConfig) -> Self {
        Self {
            path: config.path,
            override_token: None,
        }
    }

    /// Attach an externally supplied token. Blank values count as absent.
    pub fn with_override(mut self, token: Option<String>) -> Self {
        self.override_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_override(&self) -> bool {
        self.override_token.is_some()
    }

    fn read_file(&self) -> Result<Option<Credential>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: CredentialFile = serde_json::from_str(&raw)?;
        if file.version != CREDENTIAL_FILE_VERSION {
            return Err(AuthError::Serialization(format!(
                "unsupported credential file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        if file.credential.access_token().trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(file.credential))
    }
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .field("override", &self.override_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl CredentialStore for FileCredentialStore {
    fn resolve(&self) -> Result<Option<ResolvedCredential>, AuthError> {
        if let Some(token) = &self.override_token {
            return Ok(Some(ResolvedCredential {
                credential: Credential::new(token.clone()),
                source: CredentialSource::Override,
            }));
        }
        Ok(self.read_file()?.map(|credential| ResolvedCredential {
            credential,
            source: CredentialSource::File,
        }))
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let file = CredentialFile {
            version: CREDENTIAL_FILE_VERSION,
            credential: credential.clone(),
            saved_at: Utc::now(),
        };
        let serialized = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.path, &serialized)
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFile {
    version: u32,
    #[serde(flatten)]
    credential: Credential,
    saved_at: DateTime<Utc>,
}

fn ensure_private_dir(dir: &Path) -> Result<(), AuthError> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir)?;
    Ok(())
}

/// Write `data` to a sibling temp file, then rename over `path`.
///
/// Readers observe either the old file or the new one, never a prefix.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Io(format!("credential path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::Io(err.to_string()));
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::Io(err.to_string()));
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileCredentialStore) {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(CredentialStoreConfig::in_dir(
            dir.path().join("workdesk"),
        ));
        (dir, store)
    }

    #[test]
    fn save_then_load_round_trips_token() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("wd_token_1")).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token(), "wd_token_1");
    }

    #[test]
    fn load_without_file_or_override_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn override_wins_over_file() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("from-file")).unwrap();
        let store = store.with_override(Some("from-env".to_string()));

        let resolved = store.resolve().unwrap().unwrap();
        assert_eq!(resolved.credential.access_token(), "from-env");
        assert_eq!(resolved.source, CredentialSource::Override);
    }

    #[test]
    fn blank_override_is_ignored() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("from-file")).unwrap();
        let store = store.with_override(Some("   ".to_string()));

        let resolved = store.resolve().unwrap().unwrap();
        assert_eq!(resolved.credential.access_token(), "from-file");
        assert_eq!(resolved.source, CredentialSource::File);
    }

    #[test]
    fn clear_removes_file_but_not_override() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("from-file")).unwrap();
        let store = store.with_override(Some("from-env".to_string()));

        store.clear().unwrap();

        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap().unwrap().access_token(), "from-env");
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, store) = temp_store();
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn save_overwrites_previous_credential() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("first")).unwrap();
        store.save(&Credential::new("second")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().access_token(), "second");

        let parent = store.path().parent().unwrap();
        let leftovers: Vec<_> = fs::read_dir(parent)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn file_is_a_json_object_with_the_token() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("wd_json")).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access_token"], "wd_json");
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("wd")).unwrap();
        fs::write(
            store.path(),
            r#"{"version":9,"access_token":"wd","saved_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(store.load(), Err(AuthError::Serialization(_))));
    }

    #[cfg(unix)]
    #[test]
    fn file_and_directory_are_owner_only() {
        let (_dir, store) = temp_store();
        store.save(&Credential::new("wd_private")).unwrap();

        let file_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);

        let dir_mode = fs::metadata(store.path().parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o077, 0);
    }

    #[test]
    fn debug_redacts_override() {
        let (_dir, store) = temp_store();
        let store = store.with_override(Some("env-secret".to_string()));
        assert!(!format!("{store:?}").contains("env-secret"));
    }
}
