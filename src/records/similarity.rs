// Similarity index over competency texts, with an in-process fallback

use crate::error::StoreError;
use crate::utils::{lock_mutex_recover, tokenize};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A query hit; lower distance is closer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub metadata: Value,
    pub distance: f64,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Add or replace an entry
    async fn index(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreError>;

    /// Drop every entry whose metadata carries `session_id`
    async fn remove_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// The `k` closest entries to `text`
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, StoreError>;

    /// The `k` closest entries whose metadata carries `session_id`
    async fn query_session(
        &self,
        text: &str,
        k: usize,
        session_id: &str,
    ) -> Result<Vec<Neighbor>, StoreError> {
        Ok(self
            .query(text, usize::MAX)
            .await?
            .into_iter()
            .filter(|n| n.metadata["session_id"].as_str() == Some(session_id))
            .take(k)
            .collect())
    }
}

/// Distance used by the in-process index: 0.0 when one text contains the
/// other, otherwise one minus the share of query tokens found in the entry.
pub fn naive_distance(query: &str, text: &str) -> f64 {
    let q = query.trim().to_lowercase();
    let t = text.trim().to_lowercase();
    if q.is_empty() || t.is_empty() {
        return 1.0;
    }
    if t.contains(&q) || q.contains(&t) {
        return 0.0;
    }

    let query_tokens: HashSet<String> = tokenize(&q).into_iter().collect();
    if query_tokens.is_empty() {
        return 1.0;
    }
    let text_tokens: HashSet<String> = tokenize(&t).into_iter().collect();
    let shared = query_tokens.intersection(&text_tokens).count();
    1.0 - shared as f64 / query_tokens.len() as f64
}

struct Entry {
    id: String,
    text: String,
    metadata: Value,
}

/// Naive token-overlap index kept in memory
#[derive(Default)]
pub struct InMemorySimilarityIndex {
    entries: Mutex<Vec<Entry>>,
}

impl InMemorySimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_mutex_recover(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SimilarityIndex for InMemorySimilarityIndex {
    async fn index(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreError> {
        let mut entries = lock_mutex_recover(&self.entries);
        let entry = Entry {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        };
        match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
        lock_mutex_recover(&self.entries).retain(|e| e.metadata["session_id"].as_str() != Some(session_id));
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, StoreError> {
        let entries = lock_mutex_recover(&self.entries);
        let mut hits: Vec<Neighbor> = entries
            .iter()
            .map(|e| Neighbor {
                id: e.id.clone(),
                metadata: e.metadata.clone(),
                distance: naive_distance(text, &e.text),
            })
            .collect();
        // Stable sort keeps insertion order among equal distances
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Index that prefers an external backend and falls back to the in-process one.
/// Once a primary write fails the primary is treated as incomplete and every
/// later query is answered in-process.
pub struct ResilientIndex {
    primary: Option<Arc<dyn SimilarityIndex>>,
    fallback: InMemorySimilarityIndex,
    primary_degraded: AtomicBool,
}

impl ResilientIndex {
    pub fn new(primary: Option<Arc<dyn SimilarityIndex>>) -> Self {
        Self {
            primary,
            fallback: InMemorySimilarityIndex::new(),
            primary_degraded: AtomicBool::new(false),
        }
    }

    /// True once the primary has missed a write
    pub fn is_degraded(&self) -> bool {
        self.primary_degraded.load(Ordering::Relaxed)
    }

    fn active_primary(&self) -> Option<&Arc<dyn SimilarityIndex>> {
        self.primary.as_ref().filter(|_| !self.is_degraded())
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SimilarityIndex for ResilientIndex {
    async fn index(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreError> {
        if let Some(primary) = self.active_primary() {
            if let Err(e) = primary.index(id, text, metadata.clone()).await {
                log::warn!("Similarity backend unavailable for indexing, using in-memory: {}", e);
                self.primary_degraded.store(true, Ordering::Relaxed);
            }
        }
        self.fallback.index(id, text, metadata).await
    }

    async fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
        if let Some(primary) = self.active_primary() {
            if let Err(e) = primary.remove_session(session_id).await {
                log::warn!("Similarity backend failed to drop session {}: {}", session_id, e);
                self.primary_degraded.store(true, Ordering::Relaxed);
            }
        }
        self.fallback.remove_session(session_id).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, StoreError> {
        if let Some(primary) = self.active_primary() {
            match primary.query(text, k).await {
                Ok(hits) => return Ok(hits),
                Err(e) => log::warn!("Similarity backend query failed, using in-memory: {}", e),
            }
        }
        self.fallback.query(text, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenIndex;

    #[async_trait]
    impl SimilarityIndex for BrokenIndex {
        async fn index(&self, _id: &str, _text: &str, _metadata: Value) -> Result<(), StoreError> {
            Err(StoreError::Io("connection refused".into()))
        }

        async fn remove_session(&self, _session_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Io("connection refused".into()))
        }

        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<Neighbor>, StoreError> {
            Err(StoreError::Io("connection refused".into()))
        }
    }

    /// Accepts only the first write, answers queries from what it has
    struct FlakyIndex {
        inner: InMemorySimilarityIndex,
        writes: Mutex<usize>,
    }

    #[async_trait]
    impl SimilarityIndex for FlakyIndex {
        async fn index(&self, id: &str, text: &str, metadata: Value) -> Result<(), StoreError> {
            {
                let mut writes = self.writes.lock().unwrap();
                *writes += 1;
                if *writes > 1 {
                    return Err(StoreError::Io("write timed out".into()));
                }
            }
            self.inner.index(id, text, metadata).await
        }

        async fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
            self.inner.remove_session(session_id).await
        }

        async fn query(&self, text: &str, k: usize) -> Result<Vec<Neighbor>, StoreError> {
            self.inner.query(text, k).await
        }
    }

    #[test]
    fn test_naive_distance() {
        assert_eq!(naive_distance("battery", "Battery cells - high density"), 0.0);
        assert_eq!(naive_distance("solid state battery", "battery packs"), 1.0 - 1.0 / 3.0);
        assert_eq!(naive_distance("robots", "battery packs"), 1.0);
        assert_eq!(naive_distance("", "anything"), 1.0);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = InMemorySimilarityIndex::new();
        index.index("a", "Autonomous driving software", json!({})).await.unwrap();
        index.index("b", "Battery chemistry research", json!({})).await.unwrap();
        index.index("c", "Battery pack assembly", json!({})).await.unwrap();

        let hits = index.query("battery pack", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "c");
        assert_eq!(hits[1].id, "b");
    }

    #[tokio::test]
    async fn test_reindex_replaces_entry() {
        let index = InMemorySimilarityIndex::new();
        index.index("a", "old text", json!({})).await.unwrap();
        index.index("a", "new text", json!({})).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("new text", 1).await.unwrap()[0].distance, 0.0);
    }

    #[tokio::test]
    async fn test_query_session_filters_metadata() {
        let index = InMemorySimilarityIndex::new();
        index.index("a", "battery", json!({"session_id": "s1"})).await.unwrap();
        index.index("b", "battery", json!({"session_id": "s2"})).await.unwrap();

        let hits = index.query_session("battery", 5, "s2").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_remove_session_drops_only_that_session() {
        let index = InMemorySimilarityIndex::new();
        index.index("a", "battery", json!({"session_id": "s1"})).await.unwrap();
        index.index("b", "battery", json!({"session_id": "s2"})).await.unwrap();

        index.remove_session("s1").await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("battery", 5).await.unwrap()[0].id, "b");
    }

    #[tokio::test]
    async fn test_partial_primary_writes_switch_queries_to_fallback() {
        let primary = Arc::new(FlakyIndex {
            inner: InMemorySimilarityIndex::new(),
            writes: Mutex::new(0),
        });
        let index = ResilientIndex::new(Some(primary));
        index.index("a", "battery packs", json!({})).await.unwrap();
        assert!(!index.is_degraded());
        index.index("b", "battery cells", json!({})).await.unwrap();
        assert!(index.is_degraded());

        let hits = index.query("battery", 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_resilient_index_falls_back() {
        let index = ResilientIndex::new(Some(Arc::new(BrokenIndex)));
        index.index("a", "battery", json!({})).await.unwrap();

        let hits = index.query("battery", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }
}
