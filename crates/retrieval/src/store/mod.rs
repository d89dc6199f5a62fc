//! Vector store abstraction for page entries.
//!
//! Defines the contract the engine needs from a durable multi-vector store and
//! ships an in-memory backend plus a Qdrant backend.

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

use crate::types::{CollectionConfig, IndexEntry, MultiVector, PageId, SearchResult};
use docseek_core::config::StoreSettings;
use docseek_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Trait for vector store backends.
///
/// Every call is atomic at the granularity the caller submits: an `upsert`
/// either stores all entries or none.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name (e.g., "memory", "qdrant")
    fn backend_name(&self) -> &str;

    /// Configuration of an existing collection, `None` if it does not exist.
    async fn collection_config(&self, name: &str) -> AppResult<Option<CollectionConfig>>;

    /// Create the collection, dropping any previous collection of that name.
    async fn create_or_replace_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> AppResult<()>;

    /// Insert or replace entries by identity.
    async fn upsert(&self, name: &str, entries: Vec<IndexEntry>) -> AppResult<()>;

    /// Number of stored entries.
    async fn count(&self, name: &str) -> AppResult<u64>;

    /// Highest stored identity, `None` for an empty collection.
    async fn max_identity(&self, name: &str) -> AppResult<Option<PageId>>;

    /// Top `limit` entries by descending MaxSim score.
    async fn query(
        &self,
        name: &str,
        query: &MultiVector,
        limit: usize,
    ) -> AppResult<Vec<SearchResult>>;
}

/// Reject a whole upsert if any entry does not match the collection dimension.
pub(crate) fn check_entries(config: &CollectionConfig, entries: &[IndexEntry]) -> AppResult<()> {
    entries
        .iter()
        .try_for_each(|entry| config.check_dimension(entry.identity, &entry.vectors))
}

/// Create a vector store based on configuration.
pub fn create_store(settings: &StoreSettings, timeout: Duration) -> AppResult<Arc<dyn VectorStore>> {
    match settings.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "qdrant" => Ok(Arc::new(QdrantStore::new(settings, timeout)?)),
        other => Err(AppError::Config(format!(
            "Unknown store backend: '{}'. Supported backends: memory, qdrant",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_store() {
        let settings = StoreSettings {
            backend: "memory".to_string(),
            ..Default::default()
        };
        let store = create_store(&settings, Duration::from_secs(1)).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_check_entries_rejects_any_mismatch() {
        use crate::types::{Distance, EntryPayload};

        let entry = |id: u64, dim: usize| IndexEntry {
            identity: PageId(id),
            vectors: MultiVector::new(vec![vec![0.5; dim]]).unwrap(),
            payload: EntryPayload {
                source_filename: format!("doc_page_{}.png", id + 1),
                page_number: None,
                extracted_text: None,
                source: "test".to_string(),
            },
        };
        let config = CollectionConfig::new(4, Distance::Cosine);

        assert!(check_entries(&config, &[entry(0, 4), entry(1, 4)]).is_ok());
        assert!(matches!(
            check_entries(&config, &[entry(0, 4), entry(1, 3)]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_create_unknown_store() {
        let settings = StoreSettings {
            backend: "sqlite".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_store(&settings, Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
    }
}
