//! Tests for search ranking and identity resolution.

use crate::embeddings::MockProvider;
use crate::engine::{DocumentIndex, EngineSettings};
use crate::store::{InMemoryStore, VectorStore};
use crate::types::PageItem;
use docseek_core::{AppConfig, AppError};
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<PageItem> {
        [
            "Paris climate agreement signed by member nations",
            "Quarterly revenue of the mining division",
            "Nickel output and climate targets for smelters",
            "Employee safety training calendar",
            "Agreement on copper supply with regional partners",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            PageItem::new(format!("archive.pdf_page_{}.png", i + 1))
                .with_page_number(i as u32 + 1)
                .with_dimensions(1240, 1754)
                .with_text(*text)
        })
        .collect()
    }

    async fn populated(store: Arc<InMemoryStore>, items: &[PageItem]) -> DocumentIndex {
        let settings = EngineSettings::from_config(&AppConfig::default()).unwrap();
        let index = DocumentIndex::new("pages", store, Arc::new(MockProvider::new(64)), settings);
        index.index(items, &index.index_options()).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_query_returns_ranked_results_within_limit() {
        let store = Arc::new(InMemoryStore::new());
        let items = pages();
        let index = populated(store.clone(), &items).await;

        let results = index.search("climate agreement", 2).await.unwrap();

        assert!(results.len() <= 2);
        assert!(!results.is_empty());
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        let stored = store.identities("pages").await;
        for result in &results {
            assert!(stored.contains(&result.identity));
        }

        // The page mentioning both terms wins.
        assert_eq!(results[0].identity.0, 0);
    }

    #[tokio::test]
    async fn test_top_k_rules() {
        let store = Arc::new(InMemoryStore::new());
        let items = pages();
        let index = populated(store, &items).await;

        assert!(matches!(
            index.search("climate", 0).await,
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            index.search("climate", -1).await,
            Err(AppError::Config(_))
        ));

        // Clamped to max_top_k (20), bounded by the five stored pages.
        let all = index.search("climate", 1000).await.unwrap();
        assert_eq!(all.len(), items.len());
    }

    #[tokio::test]
    async fn test_search_and_resolve_returns_pages() {
        let store = Arc::new(InMemoryStore::new());
        let items = pages();
        let index = populated(store, &items).await;

        let hits = index
            .search_and_resolve("copper supply agreement", 3, &items)
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].item.source_filename, "archive.pdf_page_5.png");

        let document = hits[0].to_document();
        assert_eq!(document.index, 4);
        assert_eq!(document.page_number, Some(5));
        assert_eq!(document.width, Some(1240));

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["filename"], "archive.pdf_page_5.png");
    }

    #[tokio::test]
    async fn test_resolve_against_shorter_page_list_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let items = pages();
        let index = populated(store, &items).await;

        let result = index
            .search_and_resolve("employee safety training", 1, &items[..2])
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_on_fresh_engine_adopts_store_collection() {
        let store = Arc::new(InMemoryStore::new());
        let items = pages();
        populated(store.clone(), &items).await;

        let settings = EngineSettings::from_config(&AppConfig::default()).unwrap();
        let reader = DocumentIndex::new("pages", store.clone(), Arc::new(MockProvider::new(64)), settings);

        let results = reader.search("nickel output", 1).await.unwrap();
        assert_eq!(results[0].identity.0, 2);
        assert_eq!(store.count("pages").await.unwrap(), 5);
    }
}
