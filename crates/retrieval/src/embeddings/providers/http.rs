//! HTTP embedding provider.
//!
//! Talks to a multi-vector embedding service (for example a ColPali/ColQwen
//! server) over JSON:
//!
//! - `POST {endpoint}/embed/pages` with `{"model", "pages": [{"path", "filename", "page_number"}]}`
//! - `POST {endpoint}/embed/queries` with `{"model", "queries": ["..."]}`
//!
//! Both answer `{"embeddings": [[[f32]]]}`, one multi-vector per input.
//! Requests are bounded by the client timeout and never retried here.

use crate::embeddings::provider::{validate_batch_output, EmbeddingProvider};
use crate::types::{MultiVector, PageItem};
use docseek_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const PAGES_ENDPOINT: &str = "/embed/pages";
const QUERIES_ENDPOINT: &str = "/embed/queries";

/// Remote multi-vector embedding provider.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    path: String,
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_number: Option<u32>,
}

#[derive(Debug, Serialize)]
struct PagesRequest<'a> {
    model: &'a str,
    pages: Vec<PageRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct QueriesRequest<'a> {
    model: &'a str,
    queries: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<Vec<f32>>>,
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpProvider {
    /// Create a provider for the service at `endpoint`.
    ///
    /// # Errors
    /// * `AppError::Config` - If the HTTP client cannot be built
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    #[instrument(skip(self, body), fields(model = %self.model))]
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<Vec<MultiVector>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to reach embedding service: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);

            return Err(AppError::Embedding(format!(
                "Embedding service error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        body.embeddings.into_iter().map(MultiVector::new).collect()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HttpProvider {
    fn provider_name(&self) -> &str {
        "http"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn item_issue(&self, item: &PageItem) -> Option<String> {
        item.image_path
            .is_none()
            .then(|| "no image path to embed".to_string())
    }

    #[instrument(skip(self, items), fields(batch_size = items.len(), provider = "http"))]
    async fn embed_items(&self, items: &[PageItem]) -> AppResult<Vec<MultiVector>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let pages = items
            .iter()
            .map(|item| {
                let path = item.image_path.as_ref().ok_or_else(|| {
                    AppError::Embedding(format!(
                        "Page '{}' has no image path to embed",
                        item.source_filename
                    ))
                })?;
                Ok(PageRequest {
                    path: path.to_string_lossy().into_owned(),
                    filename: &item.source_filename,
                    page_number: item.page_number,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let request = PagesRequest {
            model: &self.model,
            pages,
        };

        let embeddings = self.post(PAGES_ENDPOINT, &request).await?;
        validate_batch_output(items.len(), &embeddings)?;
        Ok(embeddings)
    }

    #[instrument(skip(self, text), fields(text_len = text.len(), provider = "http"))]
    async fn embed_query(&self, text: &str) -> AppResult<MultiVector> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty query".to_string()));
        }

        let request = QueriesRequest {
            model: &self.model,
            queries: [text],
        };

        let mut embeddings = self.post(QUERIES_ENDPOINT, &request).await?;
        validate_batch_output(1, &embeddings)?;
        embeddings
            .pop()
            .ok_or_else(|| AppError::Embedding("No query embedding returned".to_string()))
    }
}
