//! `DocumentIndex`: one collection with its provider, store and defaults.

use crate::collection::{CollectionHandle, CollectionManager, CollectionRequest};
use crate::embeddings::{create_provider, page_issue, EmbeddingProvider};
use crate::ingest::{BatchIngestor, IndexOptions, IngestionReport};
use crate::query::{QueryEngine, ResolvedHit};
use crate::store::{create_store, VectorStore};
use crate::timeouts::Timeouts;
use crate::tracker::{self, IncrementalTracker};
use crate::types::{CollectionConfig, PageItem, SearchResult};
use docseek_core::config::SearchSettings;
use docseek_core::{AppConfig, AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;

/// Defaults applied to every operation of a `DocumentIndex`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub collection: CollectionRequest,
    pub batch_size: usize,
    pub source: String,
    pub timeouts: Timeouts,
    pub search: SearchSettings,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            collection: CollectionRequest::from_config(config)?,
            batch_size: config.indexing.batch_size,
            source: config.indexing.source.clone(),
            timeouts: Timeouts::from_settings(&config.timeouts),
            search: config.search.clone(),
        })
    }
}

/// Collection summary for status output.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub backend: String,
    pub provider: String,
    pub model: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<CollectionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

pub struct DocumentIndex {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    manager: Arc<CollectionManager>,
    ingestor: Arc<BatchIngestor>,
    tracker: IncrementalTracker,
    query: QueryEngine,
    settings: EngineSettings,
}

impl DocumentIndex {
    pub fn new(
        collection: impl Into<String>,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        settings: EngineSettings,
    ) -> Self {
        let timeouts = settings.timeouts;
        let manager = Arc::new(CollectionManager::new(
            collection,
            store.clone(),
            provider.clone(),
            timeouts,
        ));
        let ingestor = Arc::new(BatchIngestor::new(
            store.clone(),
            provider.clone(),
            manager.clone(),
            timeouts,
        ));
        let tracker =
            IncrementalTracker::new(store.clone(), manager.clone(), ingestor.clone(), timeouts);
        let query = QueryEngine::new(
            store.clone(),
            provider.clone(),
            manager.clone(),
            timeouts,
            settings.search.clone(),
        );

        Self {
            store,
            provider,
            manager,
            ingestor,
            tracker,
            query,
            settings,
        }
    }

    /// Build provider and store from the application configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let settings = EngineSettings::from_config(config)?;
        let provider = create_provider(&config.embedding, settings.timeouts.embed)?;
        let store = create_store(&config.store, settings.timeouts.store)?;

        tracing::debug!(
            "Using {} store and {} embeddings ({})",
            store.backend_name(),
            provider.provider_name(),
            provider.model_name()
        );

        Ok(Self::new(config.store.collection.clone(), store, provider, settings))
    }

    pub fn collection_name(&self) -> &str {
        self.manager.name()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Ingestion options built from the configured defaults.
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions::new(
            self.settings.batch_size,
            self.settings.source.clone(),
            self.settings.collection.clone(),
        )
    }

    /// First page this index's provider can embed, used to infer the dimension.
    pub fn first_indexable<'a>(&self, items: &'a [PageItem]) -> Option<&'a PageItem> {
        items
            .iter()
            .find(|item| page_issue(self.provider.as_ref(), item).is_none())
    }

    pub async fn ensure_collection(&self, sample: Option<&PageItem>) -> AppResult<CollectionHandle> {
        self.manager
            .ensure_collection(&self.settings.collection, sample)
            .await
    }

    /// Drop and re-create the collection with the configured layout.
    pub async fn recreate_collection(&self, sample: Option<&PageItem>) -> AppResult<CollectionHandle> {
        if !self.settings.collection.allow_replace {
            return Err(AppError::Config(format!(
                "Re-creating collection '{}' drops its entries and requires allow_replace",
                self.collection_name()
            )));
        }
        self.manager
            .recreate_collection(&self.settings.collection, sample)
            .await
    }

    pub async fn index(&self, items: &[PageItem], options: &IndexOptions) -> AppResult<IngestionReport> {
        self.ingestor.index(items, options).await
    }

    pub fn select_new<'a>(&self, candidates: &'a [PageItem], already_indexed_count: u64) -> &'a [PageItem] {
        tracker::select_new(candidates, already_indexed_count)
    }

    pub async fn indexed_count(&self) -> AppResult<u64> {
        self.tracker.indexed_count().await
    }

    /// First position `index_new` would assign.
    pub async fn watermark(&self) -> AppResult<u64> {
        self.tracker.watermark().await
    }

    pub async fn index_new(
        &self,
        candidates: &[PageItem],
        options: &IndexOptions,
    ) -> AppResult<IngestionReport> {
        self.tracker.index_new(candidates, options).await
    }

    pub async fn search(&self, query_text: &str, top_k: i64) -> AppResult<Vec<SearchResult>> {
        self.query.search(query_text, top_k).await
    }

    pub async fn search_and_resolve<'a>(
        &self,
        query_text: &str,
        top_k: i64,
        items: &'a [PageItem],
    ) -> AppResult<Vec<ResolvedHit<'a>>> {
        self.query.search_and_resolve(query_text, top_k, items).await
    }

    pub async fn stats(&self) -> AppResult<CollectionStats> {
        let (config, count) = match self.manager.ready_handle().await {
            Ok(handle) => {
                let count = self
                    .settings
                    .timeouts
                    .store(self.store.count(&handle.name))
                    .await?;
                (Some(handle.config), Some(count))
            }
            Err(AppError::NotReady(_)) => (None, None),
            Err(e) => return Err(e),
        };

        Ok(CollectionStats {
            name: self.collection_name().to_string(),
            backend: self.store.backend_name().to_string(),
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
            state: self.manager.state().await.to_string(),
            config,
            count,
        })
    }
}
