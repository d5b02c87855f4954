//! Session credential storage.
//!
//! # Responsibilities
//! - Hold the access token, refresh token and expiry as plain strings
//! - Replace values atomically per key
//! - Optionally persist the whole session to a JSON file

use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::session::credentials::{SessionCredentials, StorageKey};

/// Errors raised while persisting session values.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key-value storage for session credentials.
///
/// Reads are infallible; writes may fail when the store is backed by disk.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Option<String>;

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: StorageKey) -> Result<(), StoreError>;

    /// Remove every session key.
    fn clear(&self) -> Result<(), StoreError>;

    fn access_token(&self) -> Option<String> {
        self.get(StorageKey::AccessToken)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(StorageKey::RefreshToken)
    }

    /// The full session, if both tokens are present.
    fn credentials(&self) -> Option<SessionCredentials> {
        Some(SessionCredentials {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            expires_at: self.get(StorageKey::ExpiresAt),
        })
    }

    /// Persist a freshly issued session, replacing any previous one.
    fn save_credentials(&self, credentials: &SessionCredentials) -> Result<(), StoreError> {
        self.set(StorageKey::AccessToken, &credentials.access_token)?;
        self.set(StorageKey::RefreshToken, &credentials.refresh_token)?;
        match &credentials.expires_at {
            Some(expires_at) => self.set(StorageKey::ExpiresAt, expires_at),
            None => self.remove(StorageKey::ExpiresAt),
        }
    }
}

/// A process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a session.
    pub fn with_credentials(credentials: &SessionCredentials) -> Self {
        let store = Self::new();
        store.inner.insert(StorageKey::AccessToken, credentials.access_token.clone());
        store.inner.insert(StorageKey::RefreshToken, credentials.refresh_token.clone());
        if let Some(expires_at) = &credentials.expires_at {
            store.inner.insert(StorageKey::ExpiresAt, expires_at.clone());
        }
        store
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Option<String> {
        self.inner.get(&key).map(|r| r.value().clone())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        self.inner.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StoreError> {
        self.inner.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for key in StorageKey::ALL {
            self.inner.remove(&key);
        }
        Ok(())
    }
}

/// A store persisted to a JSON file after every mutation.
#[derive(Debug)]
pub struct FileStore {
    inner: DashMap<StorageKey, String>,
    path: PathBuf,
    /// Serializes file writes between concurrent mutations.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, loading any session already saved there.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            inner: DashMap::new(),
            path: path.into(),
            write_lock: Mutex::new(()),
        };

        if store.path.exists() {
            let reader = BufReader::new(File::open(&store.path)?);
            let map: HashMap<String, String> = serde_json::from_reader(reader)?;
            for (name, value) in map {
                match StorageKey::ALL.iter().find(|k| k.as_str() == name) {
                    Some(key) => {
                        store.inner.insert(*key, value);
                    }
                    None => tracing::warn!(key = %name, "Ignoring unknown key in session file"),
                }
            }
            tracing::debug!(path = ?store.path, keys = store.inner.len(), "Loaded session file");
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the session as it looks after `change`, then apply it in memory.
    ///
    /// A failed write leaves the in-memory session untouched.
    fn commit(&self, change: Change<'_>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut snapshot: HashMap<&'static str, String> = self
            .inner
            .iter()
            .map(|r| (r.key().as_str(), r.value().clone()))
            .collect();
        match change {
            Change::Set(key, value) => {
                snapshot.insert(key.as_str(), value.to_string());
            }
            Change::Remove(key) => {
                snapshot.remove(key.as_str());
            }
            Change::Clear => snapshot.clear(),
        }

        self.write_file(&snapshot)?;

        match change {
            Change::Set(key, value) => {
                self.inner.insert(key, value.to_string());
            }
            Change::Remove(key) => {
                self.inner.remove(&key);
            }
            Change::Clear => {
                for key in StorageKey::ALL {
                    self.inner.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn write_file(&self, map: &HashMap<&'static str, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so readers never observe a half-written file.
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(create_private(&tmp_path)?);
            serde_json::to_writer(&mut writer, map)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Change<'a> {
    Set(StorageKey, &'a str),
    Remove(StorageKey),
    Clear,
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    File::create(path)
}

impl SessionStore for FileStore {
    fn get(&self, key: StorageKey) -> Option<String> {
        self.inner.get(&key).map(|r| r.value().clone())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        self.commit(Change::Set(key, value))
    }

    fn remove(&self, key: StorageKey) -> Result<(), StoreError> {
        if !self.inner.contains_key(&key) {
            return Ok(());
        }
        self.commit(Change::Remove(key))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.commit(Change::Clear)
    }
}
