//! Text-to-page search.

use crate::collection::CollectionManager;
use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;
use crate::timeouts::Timeouts;
use crate::types::{PageId, PageItem, SearchResult};
use docseek_core::config::SearchSettings;
use docseek_core::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A search hit mapped back to the caller's page.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHit<'a> {
    pub identity: PageId,
    pub score: f32,
    pub item: &'a PageItem,
}

impl ResolvedHit<'_> {
    pub fn to_document(&self) -> PageDocument {
        PageDocument {
            index: self.identity.0,
            filename: self.item.source_filename.clone(),
            page_number: self.item.page_number,
            width: self.item.pixel_width,
            height: self.item.pixel_height,
            score: self.score,
        }
    }
}

/// Serialisable view of a resolved hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDocument {
    pub index: u64,
    pub filename: String,
    pub page_number: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub score: f32,
}

pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    manager: Arc<CollectionManager>,
    timeouts: Timeouts,
    settings: SearchSettings,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        manager: Arc<CollectionManager>,
        timeouts: Timeouts,
        settings: SearchSettings,
    ) -> Self {
        Self {
            store,
            provider,
            manager,
            timeouts,
            settings,
        }
    }

    /// Validate `top_k` and clamp it to the configured maximum.
    pub fn effective_limit(&self, top_k: i64) -> AppResult<usize> {
        if top_k <= 0 {
            return Err(AppError::Config(format!(
                "top_k must be a positive integer, got {}",
                top_k
            )));
        }

        let max = self.settings.max_top_k;
        let limit = usize::try_from(top_k).unwrap_or(usize::MAX);
        if limit > max {
            debug!("Clamping top_k {} to {}", limit, max);
        }
        Ok(limit.min(max))
    }

    /// Embed `query_text` and return the store's ranking unchanged.
    #[instrument(skip(self), fields(collection = %self.manager.name()))]
    pub async fn search(&self, query_text: &str, top_k: i64) -> AppResult<Vec<SearchResult>> {
        let limit = self.effective_limit(top_k)?;

        if query_text.trim().is_empty() {
            return Err(AppError::Config("Query text must not be empty".to_string()));
        }

        let handle = self.manager.ready_handle().await?;

        let query = self
            .timeouts
            .embed(self.provider.embed_query(query_text))
            .await?;

        if query.dimension() != handle.config.dimension {
            return Err(AppError::Config(format!(
                "Query embedding dimension {} does not match collection dimension {}",
                query.dimension(),
                handle.config.dimension
            )));
        }

        let results = self
            .timeouts
            .store(self.store.query(&handle.name, &query, limit))
            .await?;

        info!("Search returned {} results (limit {})", results.len(), limit);
        Ok(results)
    }

    /// Search, then map each identity to the page at that position of `items`.
    ///
    /// A hit without a matching page means the index and the page list have
    /// drifted apart, which is reported as `NotFound`.
    pub async fn search_and_resolve<'a>(
        &self,
        query_text: &str,
        top_k: i64,
        items: &'a [PageItem],
    ) -> AppResult<Vec<ResolvedHit<'a>>> {
        let results = self.search(query_text, top_k).await?;
        results.iter().map(|r| resolve(r, items)).collect()
    }
}

fn resolve<'a>(result: &SearchResult, items: &'a [PageItem]) -> AppResult<ResolvedHit<'a>> {
    let item = items.get(result.identity.position()).ok_or_else(|| {
        AppError::NotFound(format!(
            "Indexed page {} has no matching page ({} pages loaded)",
            result.identity,
            items.len()
        ))
    })?;

    if let Some(payload) = &result.payload {
        if payload.source_filename != item.source_filename {
            return Err(AppError::NotFound(format!(
                "Indexed page {} is '{}' but position {} holds '{}'",
                result.identity,
                payload.source_filename,
                result.identity.position(),
                item.source_filename
            )));
        }
    }

    Ok(ResolvedHit {
        identity: result.identity,
        score: result.score,
        item,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::MockEmbeddingProvider;
    use crate::embeddings::MockProvider;
    use crate::store::{InMemoryStore, MockVectorStore};
    use crate::types::{CollectionConfig, Distance, MultiVector};

    fn engine(store: Arc<dyn VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> QueryEngine {
        let timeouts = Timeouts::default();
        let manager = Arc::new(CollectionManager::new("pages", store.clone(), provider.clone(), timeouts));
        QueryEngine::new(store, provider, manager, timeouts, SearchSettings::default())
    }

    fn hit(id: u64, filename: &str) -> SearchResult {
        SearchResult {
            identity: PageId(id),
            score: 1.0,
            payload: Some(PageItem::new(filename).payload("test")),
        }
    }

    #[test]
    fn test_top_k_validation_and_clamp() {
        let engine = engine(Arc::new(InMemoryStore::new()), Arc::new(MockProvider::new(8)));
        assert!(matches!(engine.effective_limit(0), Err(AppError::Config(_))));
        assert!(matches!(engine.effective_limit(-3), Err(AppError::Config(_))));
        assert_eq!(engine.effective_limit(3).unwrap(), 3);
        assert_eq!(engine.effective_limit(500).unwrap(), 20);
    }

    #[tokio::test]
    async fn test_search_before_collection_is_not_ready() {
        let engine = engine(Arc::new(InMemoryStore::new()), Arc::new(MockProvider::new(8)));
        assert!(matches!(
            engine.search("climate", 2).await,
            Err(AppError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_search_passes_clamped_limit_and_keeps_order() {
        let mut store = MockVectorStore::new();
        store
            .expect_collection_config()
            .returning(|_| Ok(Some(CollectionConfig::new(8, Distance::Cosine))));
        store
            .expect_query()
            .withf(|name, _, limit| name == "pages" && *limit == 20)
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    SearchResult { identity: PageId(4), score: 0.9, payload: None },
                    SearchResult { identity: PageId(1), score: 0.9, payload: None },
                ])
            });

        let engine = engine(Arc::new(store), Arc::new(MockProvider::new(8)));
        let results = engine.search("climate agreement", 100).await.unwrap();

        let ids: Vec<u64> = results.iter().map(|r| r.identity.0).collect();
        assert_eq!(ids, vec![4, 1]);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_propagates() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_or_replace_collection("pages", &CollectionConfig::new(2, Distance::Cosine))
            .await
            .unwrap();

        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_query()
            .returning(|_| Err(AppError::Embedding("service down".to_string())));

        let engine = engine(store, Arc::new(provider));
        assert!(matches!(
            engine.search("anything", 1).await,
            Err(AppError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_is_config_error() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_or_replace_collection("pages", &CollectionConfig::new(2, Distance::Cosine))
            .await
            .unwrap();

        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_query()
            .returning(|_| Ok(MultiVector::new(vec![vec![1.0, 0.0, 0.0]]).unwrap()));

        let engine = engine(store, Arc::new(provider));
        assert!(matches!(
            engine.search("anything", 1).await,
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_maps_position() {
        let items = vec![PageItem::new("a.png"), PageItem::new("b.png").with_dimensions(800, 1200)];
        let resolved = resolve(&hit(1, "b.png"), &items).unwrap();
        assert_eq!(resolved.item.source_filename, "b.png");

        let document = resolved.to_document();
        assert_eq!(document.index, 1);
        assert_eq!(document.width, Some(800));
    }

    #[test]
    fn test_resolve_missing_position_is_not_found() {
        let items = vec![PageItem::new("a.png")];
        assert!(matches!(
            resolve(&hit(5, "f.png"), &items),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_detects_reordered_pages() {
        let items = vec![PageItem::new("b.png"), PageItem::new("a.png")];
        assert!(matches!(
            resolve(&hit(0, "a.png"), &items),
            Err(AppError::NotFound(_))
        ));
    }
}
