use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::record::{Artwork, RecordId};

pub const SELECTION_KEY: &str = "selectedRows";
pub const PENDING_KEY: &str = "remainingToSelect";
pub const PAGE_KEY: &str = "currentPage";
pub const DISMISSED_KEY: &str = "dismissedRows";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state file: {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove state file: {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// String key/value persistence that outlives the process.
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;

    /// Writes several keys. Implementations backed by a single file override
    /// this to write once.
    fn set_all(&mut self, entries: Vec<(&str, String)>) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// A JSON object on disk, rewritten in full on every write.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens `path`. A missing, unreadable or corrupt file yields an empty
    /// store; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("ignoring corrupt state file '{}': {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("failed to read state file '{}': {e}", path.display());
                BTreeMap::new()
            }
        };
        debug!("opened state file '{}' ({} keys)", path.display(), entries.len());
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forgets everything, including the file on disk.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Remove {
                path: self.path.display().to_string(),
                source: e,
            }),
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::Encode { source: e })?;
        // write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn set_all(&mut self, entries: Vec<(&str, String)>) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value);
        }
        self.flush()
    }
}

/// The snapshot mirrored to the store after every mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedState {
    pub selection: Vec<Artwork>,
    pub pending: u32,
    pub current_page: u32,
    pub dismissed: Vec<RecordId>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            selection: Vec::new(),
            pending: 0,
            current_page: 1,
            dismissed: Vec::new(),
        }
    }
}

impl PersistedState {
    /// Reads every key independently; anything absent or unparseable falls
    /// back to its default.
    pub fn load<S: StateStore + ?Sized>(store: &S) -> Self {
        let defaults = Self::default();
        Self {
            selection: read_key(store, SELECTION_KEY, |raw| serde_json::from_str(raw).ok())
                .unwrap_or(defaults.selection),
            pending: read_key(store, PENDING_KEY, |raw| raw.trim().parse::<u32>().ok())
                .unwrap_or(defaults.pending),
            current_page: read_key(store, PAGE_KEY, |raw| {
                raw.trim().parse::<u32>().ok().filter(|p| *p >= 1)
            })
            .unwrap_or(defaults.current_page),
            dismissed: read_key(store, DISMISSED_KEY, |raw| serde_json::from_str(raw).ok())
                .unwrap_or(defaults.dismissed),
        }
    }

    pub fn save<S: StateStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        let selection = serde_json::to_string(&self.selection)
            .map_err(|e| StoreError::Encode { source: e })?;
        let dismissed = serde_json::to_string(&self.dismissed)
            .map_err(|e| StoreError::Encode { source: e })?;
        store.set_all(vec![
            (SELECTION_KEY, selection),
            (PENDING_KEY, self.pending.to_string()),
            (PAGE_KEY, self.current_page.to_string()),
            (DISMISSED_KEY, dismissed),
        ])
    }
}

fn read_key<S, T>(store: &S, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T>
where
    S: StateStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("failed to read '{key}' from state store: {e}");
            return None;
        }
    };
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!("ignoring corrupt '{key}' value in state store");
    }
    parsed
}
