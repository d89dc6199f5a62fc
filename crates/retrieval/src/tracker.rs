//! Incremental ingestion with a store-derived watermark.
//!
//! A candidate is new when its position is at or beyond the watermark: the
//! larger of the stored entry count and one past the highest stored identity.
//! Skipped pages leave identity gaps, so the count alone can lag behind.
//! Callers must present candidates in the order used when they were first
//! indexed.

use crate::collection::CollectionManager;
use crate::ingest::{BatchIngestor, IndexOptions, IngestionReport};
use crate::store::VectorStore;
use crate::timeouts::Timeouts;
use crate::types::PageItem;
use docseek_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Suffix of `candidates` not yet indexed.
pub fn select_new(candidates: &[PageItem], already_indexed_count: u64) -> &[PageItem] {
    let start = usize::try_from(already_indexed_count)
        .unwrap_or(usize::MAX)
        .min(candidates.len());

    if already_indexed_count > candidates.len() as u64 {
        debug!(
            "Store holds {} entries but only {} candidates were given",
            already_indexed_count,
            candidates.len()
        );
    }

    &candidates[start..]
}

/// Reads the watermark from the store and indexes only the new suffix.
pub struct IncrementalTracker {
    store: Arc<dyn VectorStore>,
    manager: Arc<CollectionManager>,
    ingestor: Arc<BatchIngestor>,
    timeouts: Timeouts,
}

impl IncrementalTracker {
    pub fn new(
        store: Arc<dyn VectorStore>,
        manager: Arc<CollectionManager>,
        ingestor: Arc<BatchIngestor>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            manager,
            ingestor,
            timeouts,
        }
    }

    /// Number of entries already stored.
    ///
    /// A missing collection counts as zero. Any failure to reach the store is
    /// an error, never an assumed zero.
    pub async fn indexed_count(&self) -> AppResult<u64> {
        let handle = match self.manager.ready_handle().await {
            Ok(handle) => handle,
            Err(AppError::NotReady(_)) => return Ok(0),
            Err(e) => return Err(unavailable(e)),
        };

        self.timeouts
            .store(self.store.count(&handle.name))
            .await
            .map_err(unavailable)
    }

    /// First position not yet covered by a stored entry.
    pub async fn watermark(&self) -> AppResult<u64> {
        let handle = match self.manager.ready_handle().await {
            Ok(handle) => handle,
            Err(AppError::NotReady(_)) => return Ok(0),
            Err(e) => return Err(unavailable(e)),
        };

        let count = self
            .timeouts
            .store(self.store.count(&handle.name))
            .await
            .map_err(unavailable)?;
        let max_identity = self
            .timeouts
            .store(self.store.max_identity(&handle.name))
            .await
            .map_err(unavailable)?;

        let watermark = max_identity.map_or(count, |id| count.max(id.0 + 1));
        if watermark != count {
            debug!(
                "Watermark {} is past the entry count {} (skipped pages)",
                watermark, count
            );
        }
        Ok(watermark)
    }

    /// Index the candidates beyond the stored watermark.
    ///
    /// The watermark is read under the collection's writer lock, so two
    /// incremental runs cannot assign the same identities, and no stored
    /// page is embedded twice.
    pub async fn index_new(
        &self,
        candidates: &[PageItem],
        options: &IndexOptions,
    ) -> AppResult<IngestionReport> {
        let guard = self.manager.lock_writer().await;

        let watermark = self.watermark().await?;
        let new_items = select_new(candidates, watermark);
        info!(
            "{} of {} candidates are new (watermark {})",
            new_items.len(),
            candidates.len(),
            watermark
        );

        let options = options.clone().with_start_offset(watermark);
        self.ingestor.run(&guard, new_items, &options).await
    }
}

fn unavailable(err: AppError) -> AppError {
    match err {
        AppError::StoreUnavailable(_) | AppError::Config(_) => err,
        other => AppError::StoreUnavailable(format!("Cannot read indexed count: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionRequest;
    use crate::embeddings::{EmbeddingProvider, MockProvider};
    use crate::store::{InMemoryStore, MockVectorStore};
    use crate::types::{CollectionConfig, Distance, PageId};

    fn pages(n: usize) -> Vec<PageItem> {
        (0..n)
            .map(|i| PageItem::new(format!("doc_page_{}.png", i + 1)).with_page_number(i as u32 + 1))
            .collect()
    }

    fn tracker(store: Arc<dyn VectorStore>) -> IncrementalTracker {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::new(8));
        let timeouts = Timeouts::default();
        let manager = Arc::new(CollectionManager::new("pages", store.clone(), provider.clone(), timeouts));
        let ingestor = Arc::new(BatchIngestor::new(store.clone(), provider, manager.clone(), timeouts));
        IncrementalTracker::new(store, manager, ingestor, timeouts)
    }

    fn options() -> IndexOptions {
        IndexOptions::new(2, "test", CollectionRequest::new(Distance::Cosine))
    }

    #[test]
    fn test_select_new_returns_suffix() {
        let candidates = pages(4);
        assert_eq!(select_new(&candidates, 0), &candidates[..]);
        assert_eq!(select_new(&candidates, 3), &candidates[3..]);
        assert!(select_new(&candidates, 4).is_empty());
        assert!(select_new(&candidates, 9).is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_counts_zero() {
        let tracker = tracker(Arc::new(InMemoryStore::new()));
        assert_eq!(tracker.indexed_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_not_zero() {
        let mut store = MockVectorStore::new();
        store
            .expect_collection_config()
            .returning(|_| Err(AppError::StoreUnavailable("connection refused".to_string())));

        let tracker = tracker(Arc::new(store));
        assert!(matches!(
            tracker.indexed_count().await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_count_failure_is_store_unavailable() {
        let mut store = MockVectorStore::new();
        store
            .expect_collection_config()
            .returning(|_| Ok(Some(CollectionConfig::new(8, Distance::Cosine))));
        store
            .expect_count()
            .returning(|_| Err(AppError::Other("socket closed".to_string())));

        let tracker = tracker(Arc::new(store));
        assert!(matches!(
            tracker.indexed_count().await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_index_new_continues_from_watermark() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = tracker(store.clone());
        let candidates = pages(5);

        let first = tracker.index_new(&candidates[..3], &options()).await.unwrap();
        assert_eq!(first.identities, vec![PageId(0), PageId(1), PageId(2)]);

        let second = tracker.index_new(&candidates, &options()).await.unwrap();
        assert_eq!(second.start_offset, 3);
        assert_eq!(second.identities, vec![PageId(3), PageId(4)]);
        assert_eq!(store.count("pages").await.unwrap(), 5);

        let third = tracker.index_new(&candidates, &options()).await.unwrap();
        assert_eq!(third.items_total, 0);
        assert!(third.identities.is_empty());
        assert_eq!(store.count("pages").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_skipped_page_never_shifts_later_runs() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = tracker(store.clone());
        let mut candidates = pages(5);
        candidates[1].source_filename = String::new();

        let first = tracker.index_new(&candidates[..3], &options()).await.unwrap();
        assert_eq!(first.identities, vec![PageId(0), PageId(2)]);
        assert_eq!(first.skipped[0].identity, PageId(1));
        assert_eq!(store.count("pages").await.unwrap(), 2);
        assert_eq!(tracker.watermark().await.unwrap(), 3);

        let second = tracker.index_new(&candidates[..4], &options()).await.unwrap();
        assert_eq!(second.start_offset, 3);
        assert_eq!(second.identities, vec![PageId(3)]);

        let third = tracker.index_new(&candidates, &options()).await.unwrap();
        assert_eq!(third.start_offset, 4);
        assert_eq!(third.identities, vec![PageId(4)]);

        assert_eq!(
            store.identities("pages").await,
            vec![PageId(0), PageId(2), PageId(3), PageId(4)]
        );
        assert_eq!(tracker.watermark().await.unwrap(), 5);
        assert!(tracker.index_new(&candidates, &options()).await.unwrap().identities.is_empty());
    }

    #[tokio::test]
    async fn test_watermark_failure_is_store_unavailable() {
        let mut store = MockVectorStore::new();
        store
            .expect_collection_config()
            .returning(|_| Ok(Some(CollectionConfig::new(8, Distance::Cosine))));
        store.expect_count().returning(|_| Ok(3));
        store
            .expect_max_identity()
            .returning(|_| Err(AppError::Other("scroll failed".to_string())));

        let tracker = tracker(Arc::new(store));
        assert!(matches!(
            tracker.watermark().await,
            Err(AppError::StoreUnavailable(_))
        ));
    }
}
