//! In-memory vector store with exact MaxSim search.

use super::{check_entries, VectorStore};
use crate::scoring::max_sim;
use crate::types::{CollectionConfig, IndexEntry, MultiVector, PageId, SearchResult};
use docseek_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug)]
struct MemoryCollection {
    config: CollectionConfig,
    entries: BTreeMap<PageId, IndexEntry>,
}

/// Process-local store, used for tests and the `memory` backend.
///
/// Scores every entry on each query; ties keep ascending identity order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entry for `identity`, if any.
    pub async fn entry(&self, name: &str, identity: PageId) -> Option<IndexEntry> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .and_then(|c| c.entries.get(&identity).cloned())
    }

    /// All stored identities in ascending order.
    pub async fn identities(&self, name: &str) -> Vec<PageId> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.entries.keys().copied().collect())
            .unwrap_or_default()
    }
}

fn missing(name: &str) -> AppError {
    AppError::NotReady(format!("Collection '{}' does not exist", name))
}

#[async_trait::async_trait]
impl VectorStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn collection_config(&self, name: &str) -> AppResult<Option<CollectionConfig>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.config.clone()))
    }

    async fn create_or_replace_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> AppResult<()> {
        config.validate()?;

        let mut collections = self.collections.write().await;
        let replaced = collections
            .insert(
                name.to_string(),
                MemoryCollection {
                    config: config.clone(),
                    entries: BTreeMap::new(),
                },
            )
            .is_some();

        tracing::debug!(
            collection = name,
            dimension = config.dimension,
            replaced,
            "Created in-memory collection"
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, entries: Vec<IndexEntry>) -> AppResult<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        // Validate the whole call before touching state.
        check_entries(&collection.config, &entries)?;

        for entry in entries {
            collection.entries.insert(entry.identity, entry);
        }
        Ok(())
    }

    async fn count(&self, name: &str) -> AppResult<u64> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.entries.len() as u64)
    }

    async fn max_identity(&self, name: &str) -> AppResult<Option<PageId>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.entries.keys().next_back().copied())
    }

    async fn query(
        &self,
        name: &str,
        query: &MultiVector,
        limit: usize,
    ) -> AppResult<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        if query.dimension() != collection.config.dimension {
            return Err(AppError::Config(format!(
                "Query dimension {} does not match collection dimension {}",
                query.dimension(),
                collection.config.dimension
            )));
        }

        let distance = collection.config.distance;
        let mut results: Vec<SearchResult> = collection
            .entries
            .values()
            .map(|entry| SearchResult {
                identity: entry.identity,
                score: max_sim(query, &entry.vectors, distance),
                payload: Some(entry.payload.clone()),
            })
            .collect();

        // Stable sort keeps identity order among equal scores.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Distance, EntryPayload};

    fn entry(id: u64, vectors: Vec<Vec<f32>>, filename: &str) -> IndexEntry {
        IndexEntry {
            identity: PageId(id),
            vectors: MultiVector::new(vectors).unwrap(),
            payload: EntryPayload {
                source_filename: filename.to_string(),
                page_number: None,
                extracted_text: None,
                source: "test".to_string(),
            },
        }
    }

    async fn store_with_collection(dimension: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .create_or_replace_collection("pages", &CollectionConfig::new(dimension, Distance::Cosine))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_same_identity_last_write_wins() {
        let store = store_with_collection(2).await;

        store
            .upsert("pages", vec![entry(7, vec![vec![1.0, 0.0]], "first.png")])
            .await
            .unwrap();
        store
            .upsert("pages", vec![entry(7, vec![vec![0.0, 1.0]], "second.png")])
            .await
            .unwrap();

        assert_eq!(store.count("pages").await.unwrap(), 1);
        let stored = store.entry("pages", PageId(7)).await.unwrap();
        assert_eq!(stored.payload.source_filename, "second.png");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_leaves_state_unchanged() {
        let store = store_with_collection(2).await;
        store
            .upsert("pages", vec![entry(0, vec![vec![1.0, 0.0]], "a.png")])
            .await
            .unwrap();

        let result = store
            .upsert(
                "pages",
                vec![
                    entry(1, vec![vec![0.0, 1.0]], "b.png"),
                    entry(2, vec![vec![0.0, 1.0, 0.0]], "c.png"),
                ],
            )
            .await;

        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(store.identities("pages").await, vec![PageId(0)]);
    }

    #[tokio::test]
    async fn test_query_orders_by_descending_score() {
        let store = store_with_collection(2).await;
        store
            .upsert(
                "pages",
                vec![
                    entry(0, vec![vec![0.0, 1.0]], "far.png"),
                    entry(1, vec![vec![1.0, 0.0]], "exact.png"),
                    entry(2, vec![vec![1.0, 1.0]], "near.png"),
                ],
            )
            .await
            .unwrap();

        let query = MultiVector::new(vec![vec![1.0, 0.0]]).unwrap();
        let results = store.query("pages", &query, 10).await.unwrap();

        let ids: Vec<u64> = results.iter().map(|r| r.identity.0).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        let limited = store.query("pages", &query, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_ties_keep_identity_order() {
        let store = store_with_collection(2).await;
        store
            .upsert(
                "pages",
                vec![
                    entry(5, vec![vec![1.0, 0.0]], "e.png"),
                    entry(3, vec![vec![1.0, 0.0]], "c.png"),
                ],
            )
            .await
            .unwrap();

        let query = MultiVector::new(vec![vec![1.0, 0.0]]).unwrap();
        let results = store.query("pages", &query, 10).await.unwrap();
        assert_eq!(results[0].identity, PageId(3));
        assert_eq!(results[1].identity, PageId(5));
    }

    #[tokio::test]
    async fn test_missing_collection_not_ready() {
        let store = InMemoryStore::new();
        assert!(matches!(store.count("nope").await, Err(AppError::NotReady(_))));
        assert!(store.collection_config("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_identity_sees_past_gaps() {
        let store = store_with_collection(2).await;
        assert_eq!(store.max_identity("pages").await.unwrap(), None);

        store
            .upsert(
                "pages",
                vec![
                    entry(0, vec![vec![1.0, 0.0]], "a.png"),
                    entry(2, vec![vec![0.0, 1.0]], "c.png"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.count("pages").await.unwrap(), 2);
        assert_eq!(store.max_identity("pages").await.unwrap(), Some(PageId(2)));
    }

    #[tokio::test]
    async fn test_replace_drops_entries() {
        let store = store_with_collection(2).await;
        store
            .upsert("pages", vec![entry(0, vec![vec![1.0, 0.0]], "a.png")])
            .await
            .unwrap();

        store
            .create_or_replace_collection("pages", &CollectionConfig::new(3, Distance::Cosine))
            .await
            .unwrap();

        assert_eq!(store.count("pages").await.unwrap(), 0);
        let config = store.collection_config("pages").await.unwrap().unwrap();
        assert_eq!(config.dimension, 3);
    }
}
