//! Key-value persistence with transparent fallback to volatile memory.
//!
//! Backends implement [`KeyValueStore`] and report failures as
//! [`StorageError`]. The [`Storage`] adapter never surfaces those errors:
//! the first failure marks the backend unavailable for the rest of the
//! process and every later call is served from an in-memory map.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Key written and removed once to check that the backend accepts writes
const PROBE_KEY: &str = "__mm_storage_probe__";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable string store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

// ==================== BACKENDS ====================

/// Volatile backend, mostly useful for tests and embedding
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/math-master`
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("math-master")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ==================== ADAPTER ====================

/// Storage adapter used by the rest of the crate
pub struct Storage {
    backend: Option<Box<dyn KeyValueStore>>,
    /// None until the first probe
    available: Option<bool>,
    memory: HashMap<String, String>,
}

impl Storage {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self {
            backend: Some(backend),
            available: None,
            memory: HashMap::new(),
        }
    }

    /// Adapter without a backend; everything lives in memory
    pub fn volatile() -> Self {
        Self {
            backend: None,
            available: Some(false),
            memory: HashMap::new(),
        }
    }

    /// File-backed storage in the platform data directory
    pub fn file_default() -> Self {
        Self::new(Box::new(FileStore::default()))
    }

    /// Whether writes currently reach the durable backend
    pub fn is_durable(&mut self) -> bool {
        self.backend_ready()
    }

    fn backend_ready(&mut self) -> bool {
        if let Some(available) = self.available {
            return available;
        }
        let probed = match self.backend.as_mut() {
            Some(backend) => backend
                .set(PROBE_KEY, "1")
                .and_then(|_| backend.remove(PROBE_KEY)),
            None => Err(StorageError::Unavailable("no backend".to_string())),
        };
        match probed {
            Ok(()) => {
                self.available = Some(true);
                true
            }
            Err(e) => {
                self.mark_unavailable("probe", &e);
                false
            }
        }
    }

    fn mark_unavailable(&mut self, op: &str, err: &StorageError) {
        if self.available != Some(false) {
            log::warn!("[STORAGE] {} failed, falling back to memory: {}", op, err);
        }
        self.available = Some(false);
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        if self.backend_ready() {
            if let Some(backend) = self.backend.as_ref() {
                match backend.get(key) {
                    Ok(value) => return value,
                    Err(e) => self.mark_unavailable("get", &e),
                }
            }
        }
        self.memory.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if key.is_empty() {
            return;
        }
        if self.backend_ready() {
            if let Some(backend) = self.backend.as_mut() {
                match backend.set(key, value) {
                    Ok(()) => return,
                    Err(e) => self.mark_unavailable("set", &e),
                }
            }
        }
        self.memory.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        if self.backend_ready() {
            if let Some(backend) = self.backend.as_mut() {
                match backend.remove(key) {
                    Ok(()) => return,
                    Err(e) => self.mark_unavailable("remove", &e),
                }
            }
        }
        self.memory.remove(key);
    }

    /// `"1"` means true, anything else (including missing) false
    pub fn get_bool(&mut self, key: &str) -> bool {
        self.get(key).as_deref() == Some("1")
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::volatile()
    }
}
