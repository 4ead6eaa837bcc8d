//! Durable storage for the session's credential pair.
//!
//! The pair is always written as one record so a reader can never observe a
//! fresh access token next to a stale refresh token.

#[cfg(target_os = "macos")]
pub mod keychain;
pub mod secure;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::{Config, StoreBackend};
use crate::error::StoreError;
use crate::settings;
pub use secure::{CredentialPair, SecureString};
use secure::StoredCredentials;

/// Persistence for the credential pair.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Load the stored pair. A missing or incomplete record is `Ok(None)`.
    fn load(&self) -> Result<Option<CredentialPair>, StoreError>;

    /// Replace the stored pair with `pair`.
    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError>;

    /// Remove any stored credentials. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Open the store selected in the configuration.
pub fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>, StoreError> {
    match config.store.backend {
        StoreBackend::File => {
            let path = settings::credentials_path(&config.store.file_name).ok_or_else(|| {
                StoreError::Read("Could not determine config directory".to_string())
            })?;
            Ok(Arc::new(FileStore::new(path)))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::default())),
        #[cfg(target_os = "macos")]
        StoreBackend::Keychain => Ok(Arc::new(keychain::KeychainStore::new())),
        #[cfg(not(target_os = "macos"))]
        StoreBackend::Keychain => Err(StoreError::Read(
            "The keychain credential store is only available on macOS".to_string(),
        )),
    }
}

/// JSON file store (`{"access": ..., "refresh": ...}`).
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        if !self.path.exists() {
            debug!("No credential file at {:?}", self.path);
            return Ok(None);
        }

        let content = Zeroizing::new(
            fs::read_to_string(&self.path).map_err(|e| StoreError::Read(e.to_string()))?,
        );

        let stored: StoredCredentials =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let pair = stored.into_pair();
        if pair.is_none() {
            warn!("Credential file {:?} holds an incomplete pair, ignoring it", self.path);
        }
        Ok(pair)
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write(e.to_string()))?;
        }

        let json = Zeroizing::new(
            serde_json::to_string(&StoredCredentials::from_pair(pair))
                .map_err(|e| StoreError::Write(e.to_string()))?,
        );

        // Write-then-rename keeps the previous pair intact if we die mid-write.
        let temp = self.temp_path();
        {
            let mut file = open_private(&temp).map_err(|e| StoreError::Write(e.to_string()))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }
        fs::rename(&temp, &self.path).map_err(|e| StoreError::Write(e.to_string()))?;

        debug!("Stored credentials at {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Delete(e.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pair: Mutex<Option<CredentialPair>>,
}

impl MemoryStore {
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        self.pair
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| StoreError::Read(e.to_string()))
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        let mut guard = self.pair.lock().map_err(|e| StoreError::Write(e.to_string()))?;
        *guard = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.pair.lock().map_err(|e| StoreError::Delete(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("credentials.json"));

        assert!(store.load().unwrap().is_none());

        store.save(&CredentialPair::new("T1", "R1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(CredentialPair::new("T1", "R1")));

        store.save(&CredentialPair::new("T2", "R2")).unwrap();
        let pair = store.load().unwrap().unwrap();
        assert_eq!(pair.access(), "T2");
        assert_eq!(pair.refresh(), "R2");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("credentials.json"));
        store.save(&CredentialPair::new("T1", "R1")).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access"], "T1");
        assert_eq!(value["refresh"], "R1");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("credentials.json"));
        store.save(&CredentialPair::new("T1", "R1")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("credentials.json"));

        // Clearing an empty store is fine
        store.clear().unwrap();

        store.save(&CredentialPair::new("T1", "R1")).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("credentials.json"));
        fs::write(store.path(), "not json").unwrap();

        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        assert!(store.load().unwrap().is_none());

        store.save(&CredentialPair::new("T1", "R1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(CredentialPair::new("T1", "R1")));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
