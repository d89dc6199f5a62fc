//! Embedding provider trait and factory.

use crate::types::{MultiVector, PageItem};
use docseek_core::config::EmbeddingSettings;
use docseek_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Turns pages and query strings into multi-vectors.
///
/// Implementations must preserve order, return exactly one multi-vector per
/// page and fail instead of substituting empty vectors.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get provider name (e.g., "mock", "http")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Why this provider cannot embed `item`, checked before each batch.
    ///
    /// Pages reported here are skipped instead of failing their batch.
    fn item_issue(&self, _item: &PageItem) -> Option<String> {
        None
    }

    /// Embed a batch of pages in a single call.
    async fn embed_items(&self, items: &[PageItem]) -> AppResult<Vec<MultiVector>>;

    /// Embed one query string.
    async fn embed_query(&self, text: &str) -> AppResult<MultiVector>;
}

/// Why `item` cannot be embedded: missing required fields first, then
/// whatever `provider` additionally needs.
pub fn page_issue(provider: &dyn EmbeddingProvider, item: &PageItem) -> Option<String> {
    item.validation_issue()
        .map(str::to_string)
        .or_else(|| provider.item_issue(item))
}

/// Check that a provider answered a batch with one consistent embedding per page.
pub fn validate_batch_output(expected: usize, embeddings: &[MultiVector]) -> AppResult<()> {
    if embeddings.len() != expected {
        return Err(AppError::Embedding(format!(
            "Provider returned {} embeddings for a batch of {}",
            embeddings.len(),
            expected
        )));
    }

    if let Some(first) = embeddings.first() {
        let dimension = first.dimension();
        if let Some((i, e)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, e)| e.dimension() != dimension)
        {
            return Err(AppError::Embedding(format!(
                "Provider returned dimension {} for page {} of the batch, expected {}",
                e.dimension(),
                i,
                dimension
            )));
        }
    }

    Ok(())
}

/// Create an embedding provider based on configuration.
pub fn create_provider(
    settings: &EmbeddingSettings,
    timeout: Duration,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => {
            let provider = super::providers::mock::MockProvider::new(settings.mock_dimension);
            Ok(Arc::new(provider))
        }

        "http" => {
            let provider = super::providers::http::HttpProvider::new(
                &settings.endpoint,
                &settings.model,
                timeout,
            )?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, http",
            settings.provider
        ))),
    }
}
