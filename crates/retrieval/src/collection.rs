//! Collection lifecycle: creation, dimension inference and adoption.
//!
//! A collection moves `Unconfigured -> Configuring -> Ready`. Every
//! configuration change happens under a single writer lock that ingestion
//! also holds, so a replacement can never race an in-flight upsert.

use crate::embeddings::{page_issue, validate_batch_output, EmbeddingProvider};
use crate::store::VectorStore;
use crate::timeouts::Timeouts;
use crate::types::{CollectionConfig, Distance, PageItem, ScalarQuantization};
use docseek_core::{AppConfig, AppError, AppResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Requested collection layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRequest {
    /// Explicit dimension; inferred from a sample page when `None`
    pub dimension: Option<usize>,
    pub distance: Distance,
    pub quantization: Option<ScalarQuantization>,
    pub on_disk_payload: bool,
    /// Permit dropping an existing collection whose layout differs
    pub allow_replace: bool,
}

impl CollectionRequest {
    pub fn new(distance: Distance) -> Self {
        Self {
            dimension: None,
            distance,
            quantization: None,
            on_disk_payload: true,
            allow_replace: false,
        }
    }

    /// Build the request described by the application configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let quantization = config
            .collection
            .quantization
            .as_ref()
            .map(|q| ScalarQuantization {
                bits: q.bits,
                quantile: q.quantile,
                always_ram: q.always_ram,
            });

        Ok(Self {
            dimension: config.collection.dimension,
            distance: config.collection.distance.parse()?,
            quantization,
            on_disk_payload: config.store.on_disk_payload,
            allow_replace: config.indexing.allow_replace,
        })
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_quantization(mut self, quantization: Option<ScalarQuantization>) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_allow_replace(mut self, allow_replace: bool) -> Self {
        self.allow_replace = allow_replace;
        self
    }

    /// Whether an existing layout satisfies this request as-is.
    pub fn accepts(&self, existing: &CollectionConfig) -> bool {
        self.dimension.map_or(true, |d| d == existing.dimension)
            && self.distance == existing.distance
            && self.quantization == existing.quantization
            && self.on_disk_payload == existing.on_disk_payload
    }

    fn resolve(&self, dimension: usize) -> CollectionConfig {
        CollectionConfig::new(dimension, self.distance)
            .with_quantization(self.quantization)
            .with_on_disk_payload(self.on_disk_payload)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dimension == Some(0) {
            return Err(AppError::Config(
                "Collection dimension must be positive".to_string(),
            ));
        }
        if let Some(quantization) = &self.quantization {
            quantization.validate()?;
        }
        Ok(())
    }
}

/// A ready collection and its fixed layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionHandle {
    pub name: String,
    pub config: CollectionConfig,
}

/// Lifecycle state of the managed collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionState {
    Unconfigured,
    Configuring,
    Ready(CollectionHandle),
}

impl CollectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionState::Unconfigured => "unconfigured",
            CollectionState::Configuring => "configuring",
            CollectionState::Ready(_) => "ready",
        }
    }
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that the caller holds the collection's writer lock.
pub(crate) struct WriterGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Owns the configuration of one named collection.
pub struct CollectionManager {
    name: String,
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    timeouts: Timeouts,
    writer: Mutex<()>,
    state: RwLock<CollectionState>,
}

impl CollectionManager {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            provider,
            timeouts,
            writer: Mutex::new(()),
            state: RwLock::new(CollectionState::Unconfigured),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CollectionState {
        self.state.read().await.clone()
    }

    pub(crate) async fn lock_writer(&self) -> WriterGuard<'_> {
        WriterGuard {
            _guard: self.writer.lock().await,
        }
    }

    /// Make the collection ready, creating it when absent.
    ///
    /// An existing collection is adopted when its layout satisfies the
    /// request. A differing one is replaced only with `allow_replace`.
    /// Without an explicit dimension, `sample` is embedded to infer it.
    pub async fn ensure_collection(
        &self,
        request: &CollectionRequest,
        sample: Option<&PageItem>,
    ) -> AppResult<CollectionHandle> {
        let guard = self.lock_writer().await;
        self.ensure_locked(&guard, request, sample).await
    }

    /// Drop and re-create the collection unconditionally.
    pub async fn recreate_collection(
        &self,
        request: &CollectionRequest,
        sample: Option<&PageItem>,
    ) -> AppResult<CollectionHandle> {
        let guard = self.lock_writer().await;
        self.configure(&guard, request, sample, true).await
    }

    pub(crate) async fn ensure_locked(
        &self,
        guard: &WriterGuard<'_>,
        request: &CollectionRequest,
        sample: Option<&PageItem>,
    ) -> AppResult<CollectionHandle> {
        if let CollectionState::Ready(handle) = &*self.state.read().await {
            if request.accepts(&handle.config) {
                return Ok(handle.clone());
            }
        }
        self.configure(guard, request, sample, false).await
    }

    async fn configure(
        &self,
        _guard: &WriterGuard<'_>,
        request: &CollectionRequest,
        sample: Option<&PageItem>,
        force_replace: bool,
    ) -> AppResult<CollectionHandle> {
        request.validate()?;

        let previous = std::mem::replace(
            &mut *self.state.write().await,
            CollectionState::Configuring,
        );

        match self.resolve_and_create(request, sample, force_replace).await {
            Ok(handle) => {
                *self.state.write().await = CollectionState::Ready(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                // A failed replace may already have dropped the old collection.
                let restored = match previous {
                    CollectionState::Ready(_) if !force_replace => previous,
                    _ => CollectionState::Unconfigured,
                };
                *self.state.write().await = restored;
                Err(e)
            }
        }
    }

    async fn resolve_and_create(
        &self,
        request: &CollectionRequest,
        sample: Option<&PageItem>,
        force_replace: bool,
    ) -> AppResult<CollectionHandle> {
        let existing = self
            .timeouts
            .store(self.store.collection_config(&self.name))
            .await?;

        if let Some(existing) = &existing {
            if !force_replace && request.accepts(existing) {
                info!(
                    "Adopting existing collection '{}' (dimension {})",
                    self.name, existing.dimension
                );
                return Ok(CollectionHandle {
                    name: self.name.clone(),
                    config: existing.clone(),
                });
            }

            if !force_replace && !request.allow_replace {
                return Err(AppError::Config(format!(
                    "Collection '{}' exists with a different layout (dimension {}, distance {}); \
                     re-creating it would drop its entries and requires allow_replace",
                    self.name, existing.dimension, existing.distance
                )));
            }
        }

        let dimension = match request.dimension {
            Some(dimension) => dimension,
            None => self.infer_dimension(sample).await?,
        };

        let config = request.resolve(dimension);
        if existing.is_some() {
            warn!("Replacing collection '{}', existing entries are dropped", self.name);
        }

        self.timeouts
            .store(self.store.create_or_replace_collection(&self.name, &config))
            .await?;

        info!(
            "Created collection '{}' (dimension {}, distance {}, quantized: {})",
            self.name,
            config.dimension,
            config.distance,
            config.quantization.is_some()
        );

        Ok(CollectionHandle {
            name: self.name.clone(),
            config,
        })
    }

    async fn infer_dimension(&self, sample: Option<&PageItem>) -> AppResult<usize> {
        let sample = sample.ok_or_else(|| {
            AppError::Config(format!(
                "Cannot infer the dimension of collection '{}' without a page to embed",
                self.name
            ))
        })?;

        if let Some(issue) = page_issue(self.provider.as_ref(), sample) {
            return Err(AppError::Config(format!(
                "Sample page cannot be embedded: {}",
                issue
            )));
        }

        debug!("Inferring dimension from '{}'", sample.source_filename);
        let embeddings = self
            .timeouts
            .embed(self.provider.embed_items(std::slice::from_ref(sample)))
            .await?;
        validate_batch_output(1, &embeddings)?;

        Ok(embeddings[0].dimension())
    }

    /// Handle for search: the cached one, or an existing collection adopted
    /// from the store. Never creates anything.
    pub async fn ready_handle(&self) -> AppResult<CollectionHandle> {
        match &*self.state.read().await {
            CollectionState::Ready(handle) => return Ok(handle.clone()),
            CollectionState::Configuring => {
                return Err(AppError::NotReady(format!(
                    "Collection '{}' is being configured",
                    self.name
                )))
            }
            CollectionState::Unconfigured => {}
        }

        let existing = self
            .timeouts
            .store(self.store.collection_config(&self.name))
            .await?;

        let Some(config) = existing else {
            return Err(AppError::NotReady(format!(
                "Collection '{}' does not exist; index some pages first",
                self.name
            )));
        };

        let handle = CollectionHandle {
            name: self.name.clone(),
            config,
        };

        let mut state = self.state.write().await;
        if *state == CollectionState::Unconfigured {
            *state = CollectionState::Ready(handle.clone());
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::MockEmbeddingProvider;
    use crate::embeddings::MockProvider;
    use crate::store::InMemoryStore;
    use crate::types::MultiVector;

    fn manager_with(store: Arc<InMemoryStore>) -> CollectionManager {
        CollectionManager::new(
            "pages",
            store,
            Arc::new(MockProvider::new(16)),
            Timeouts::default(),
        )
    }

    fn request() -> CollectionRequest {
        CollectionRequest::new(Distance::Cosine)
    }

    #[tokio::test]
    async fn test_infers_dimension_from_sample_page() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager_with(store.clone());
        let sample = PageItem::new("annual_report_page_1.png");

        let handle = manager.ensure_collection(&request(), Some(&sample)).await.unwrap();

        assert_eq!(handle.config.dimension, 16);
        assert_eq!(manager.state().await, CollectionState::Ready(handle));
        assert!(store.collection_config("pages").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_sample_and_dimension_is_config_error() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));

        let result = manager.ensure_collection(&request(), None).await;

        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(manager.state().await, CollectionState::Unconfigured);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager_with(store.clone());
        let request = request().with_dimension(16);

        manager.ensure_collection(&request, None).await.unwrap();
        store
            .upsert(
                "pages",
                vec![crate::types::IndexEntry {
                    identity: crate::types::PageId(0),
                    vectors: MultiVector::new(vec![vec![1.0; 16]]).unwrap(),
                    payload: PageItem::new("a.png").payload("test"),
                }],
            )
            .await
            .unwrap();

        // A second manager adopts instead of replacing.
        let other = manager_with(store.clone());
        other.ensure_collection(&request, None).await.unwrap();
        manager.ensure_collection(&request, None).await.unwrap();

        assert_eq!(store.count("pages").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_differing_layout_requires_allow_replace() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_or_replace_collection("pages", &CollectionConfig::new(8, Distance::Cosine))
            .await
            .unwrap();
        let manager = manager_with(store.clone());

        let refused = manager
            .ensure_collection(&request().with_dimension(16), None)
            .await;
        assert!(matches!(refused, Err(AppError::Config(_))));
        assert_eq!(
            store.collection_config("pages").await.unwrap().unwrap().dimension,
            8
        );

        let replaced = manager
            .ensure_collection(&request().with_dimension(16).with_allow_replace(true), None)
            .await
            .unwrap();
        assert_eq!(replaced.config.dimension, 16);
    }

    #[tokio::test]
    async fn test_adopts_existing_without_sample() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_or_replace_collection("pages", &CollectionConfig::new(8, Distance::Cosine))
            .await
            .unwrap();
        let manager = manager_with(store);

        let handle = manager.ensure_collection(&request(), None).await.unwrap();
        assert_eq!(handle.config.dimension, 8);
    }

    #[tokio::test]
    async fn test_recreate_drops_entries() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager_with(store.clone());
        let request = request().with_dimension(16);
        manager.ensure_collection(&request, None).await.unwrap();
        store
            .upsert(
                "pages",
                vec![crate::types::IndexEntry {
                    identity: crate::types::PageId(0),
                    vectors: MultiVector::new(vec![vec![1.0; 16]]).unwrap(),
                    payload: PageItem::new("a.png").payload("test"),
                }],
            )
            .await
            .unwrap();

        manager.recreate_collection(&request, None).await.unwrap();
        assert_eq!(store.count("pages").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ready_handle_not_ready_when_absent() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            manager.ready_handle().await,
            Err(AppError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_inference_failure_reverts_state() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_item_issue().returning(|_| None);
        provider
            .expect_embed_items()
            .returning(|_| Err(AppError::Embedding("model offline".to_string())));

        let manager = CollectionManager::new(
            "pages",
            Arc::new(InMemoryStore::new()),
            Arc::new(provider),
            Timeouts::default(),
        );

        let result = manager
            .ensure_collection(&request(), Some(&PageItem::new("a.png")))
            .await;

        assert!(matches!(result, Err(AppError::Embedding(_))));
        assert_eq!(manager.state().await, CollectionState::Unconfigured);
    }

    #[test]
    fn test_request_from_default_config() {
        let request = CollectionRequest::from_config(&AppConfig::default()).unwrap();
        assert_eq!(request.distance, Distance::Cosine);
        assert_eq!(request.quantization, Some(ScalarQuantization::default()));
        assert!(!request.allow_replace);
        assert!(request.dimension.is_none());
    }
}
