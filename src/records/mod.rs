// Structured record persistence for competencies and ideas

pub mod file_store;
pub mod similarity;

use crate::error::StoreError;
use crate::utils::lock_mutex_recover;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub use file_store::JsonFileRecordStore;
pub use similarity::{
    InMemorySimilarityIndex, Neighbor, ResilientIndex, SimilarityIndex,
};

/// Record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Competencies,
    Ideas,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Competencies => "competencies",
            Collection::Ideas => "ideas",
        }
    }
}

/// Predicate over stored records
pub type RecordFilter<'a> = &'a dyn Fn(&Value) -> bool;

/// Key-value store of JSON records grouped by collection
pub trait RecordStore: Send + Sync {
    fn insert(&self, collection: Collection, record: Value) -> Result<(), StoreError>;

    /// Delete matching records, returning how many were removed
    fn delete_where(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<usize, StoreError>;

    fn find(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<Vec<Value>, StoreError>;
}

/// Matches records owned by a session
pub fn owned_by(session_id: &str) -> impl Fn(&Value) -> bool + '_ {
    move |record: &Value| record["session_id"].as_str() == Some(session_id)
}

/// Replace every record of a session in a collection. Replaying with the
/// same input leaves exactly one copy of each record.
pub fn replace_session_records<T: Serialize>(
    store: &dyn RecordStore,
    collection: Collection,
    session_id: &str,
    records: &[T],
) -> Result<(), StoreError> {
    let removed = store.delete_where(collection, &owned_by(session_id))?;
    for record in records {
        store.insert(collection, serde_json::to_value(record)?)?;
    }
    log::debug!(
        "Replaced {} {} records for session {} with {}",
        removed,
        collection.as_str(),
        session_id,
        records.len()
    );
    Ok(())
}

/// Typed records of a session
pub fn load_session_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    session_id: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .find(collection, &owned_by(session_id))?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(StoreError::from))
        .collect()
}

/// Process-local record store
#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: Mutex<HashMap<Collection, Vec<Value>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert(&self, collection: Collection, record: Value) -> Result<(), StoreError> {
        lock_mutex_recover(&self.collections)
            .entry(collection)
            .or_default()
            .push(record);
        Ok(())
    }

    fn delete_where(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<usize, StoreError> {
        let mut collections = lock_mutex_recover(&self.collections);
        let records = collections.entry(collection).or_default();
        let before = records.len();
        records.retain(|r| !predicate(r));
        Ok(before - records.len())
    }

    fn find(&self, collection: Collection, predicate: RecordFilter<'_>) -> Result<Vec<Value>, StoreError> {
        Ok(lock_mutex_recover(&self.collections)
            .get(&collection)
            .map(|records| records.iter().filter(|r| predicate(*r)).cloned().collect())
            .unwrap_or_default())
    }
}
