//! JSON-file record store
//!
//! One `<collection>.json` file per collection under a root directory.
//! Every mutation is a locked read-modify-write followed by an atomic
//! rename, so concurrent processes never observe a half-written file.

use super::{Collection, RecordFilter, RecordStore};
use crate::error::StoreError;
use crate::utils::{atomic_write, ensure_dir};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Version of the collection file format
const COLLECTION_VERSION: u32 = 1;

/// On-disk collection wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionFile {
    version: u32,
    updated_at: DateTime<Utc>,
    records: Vec<Value>,
}

impl Default for CollectionFile {
    fn default() -> Self {
        Self {
            version: COLLECTION_VERSION,
            updated_at: Utc::now(),
            records: Vec::new(),
        }
    }
}

pub struct JsonFileRecordStore {
    root: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        ensure_dir(&root).map_err(|e| StoreError::Io(format!("{}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    pub fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.as_str()))
    }

    fn lock_path(&self, collection: Collection) -> PathBuf {
        self.root.join(format!(".{}.lock", collection.as_str()))
    }

    /// Hold an exclusive lock on the collection for the duration of `f`
    fn with_lock<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&Path) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock_file: File = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(collection))
            .map_err(|e| StoreError::Io(format!("Failed to open lock file: {}", e)))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StoreError::Io(format!("Failed to lock {}: {}", collection.as_str(), e)))?;

        let result = f(&self.collection_path(collection));

        if let Err(e) = FileExt::unlock(&lock_file) {
            log::warn!("Failed to unlock {}: {}", collection.as_str(), e);
        }
        result
    }
}

fn read_collection(path: &Path) -> Result<CollectionFile, StoreError> {
    if !path.exists() {
        return Ok(CollectionFile::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_collection(path: &Path, mut file: CollectionFile) -> Result<(), StoreError> {
    file.updated_at = Utc::now();
    let content = serde_json::to_string_pretty(&file)?;
    atomic_write(path, &content)
        .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

impl RecordStore for JsonFileRecordStore {
    fn insert(&self, collection: Collection, record: Value) -> Result<(), StoreError> {
        self.with_lock(collection, |path| {
            let mut file = read_collection(path)?;
            file.records.push(record);
            write_collection(path, file)
        })
    }

    fn delete_where(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<usize, StoreError> {
        self.with_lock(collection, |path| {
            let mut file = read_collection(path)?;
            let before = file.records.len();
            file.records.retain(|r| !predicate(r));
            let removed = before - file.records.len();
            if removed > 0 {
                write_collection(path, file)?;
            }
            Ok(removed)
        })
    }

    fn find(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<Vec<Value>, StoreError> {
        self.with_lock(collection, |path| {
            Ok(read_collection(path)?
                .records
                .into_iter()
                .filter(|r| predicate(r))
                .collect())
        })
    }
}
