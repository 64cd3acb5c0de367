//! Key-value persistence backends for maps and statistics.
//!
//! The stores decide what a record looks like; a backend only moves bytes
//! to and from a named slot. Writes are synchronous and whole-record.

use crate::error::StorageError;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Key under which the statistics table is kept.
pub const STATISTICS_KEY: &str = "statistics";

/// Groups of records a backend keeps apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    /// One record per map, keyed by map name.
    Maps,
    /// The single statistics table.
    Statistics,
}

pub trait Storage: Send {
    /// Every key currently stored in `collection`.
    fn keys(&self, collection: Collection) -> Result<Vec<String>, StorageError>;

    /// Reads a record, `None` if it was never written.
    fn read(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces the record at `key`.
    fn write(&mut self, collection: Collection, key: &str, bytes: &[u8])
        -> Result<(), StorageError>;

    /// Deletes a record; returns whether one existed.
    fn remove(&mut self, collection: Collection, key: &str) -> Result<bool, StorageError>;
}

/// Whether `key` can name a record: non-empty, no path separators and no
/// leading dot.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(&['/', '\\'][..]) && !key.starts_with('.')
}

/// Stores each record as a JSON file under a data directory.
///
/// Maps live in `<root>/maps/<name>.json`, statistics in
/// `<root>/statistics.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, collection: Collection) -> PathBuf {
        match collection {
            Collection::Maps => self.root.join("maps"),
            Collection::Statistics => self.root.clone(),
        }
    }

    fn path(&self, collection: Collection, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir(collection).join(format!("{}.json", key)))
    }
}

fn io_error(key: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.display().to_string(),
        source,
    }
}

impl Storage for JsonFileStorage {
    fn keys(&self, collection: Collection) -> Result<Vec<String>, StorageError> {
        let dir = self.dir(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }

        // The statistics table shares the root with config.json
        if collection == Collection::Statistics {
            keys.retain(|key| key == STATISTICS_KEY);
        }

        keys.sort();
        Ok(keys)
    }

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path(collection, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn write(
        &mut self,
        collection: Collection,
        key: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let path = self.path(collection, key)?;
        let dir = self.dir(collection);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        fs::write(&path, bytes).map_err(|e| io_error(&path, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn remove(&mut self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        let path = self.path(collection, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// In-memory backend. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<BTreeMap<(Collection, String), Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(Collection, String), Vec<u8>>> {
        // A poisoned lock only means another test thread panicked mid-write
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn keys(&self, collection: Collection) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().get(&(collection, key.to_string())).cloned())
    }

    fn write(
        &mut self,
        collection: Collection,
        key: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.lock()
            .insert((collection, key.to_string()), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock().remove(&(collection, key.to_string())).is_some())
    }
}
