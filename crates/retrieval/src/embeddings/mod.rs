//! Multi-vector embedding of pages and queries.
//!
//! Provides the provider abstraction, a deterministic mock and an HTTP client
//! for a remote embedding service.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, page_issue, validate_batch_output, EmbeddingProvider};
pub use providers::http::HttpProvider;
pub use providers::mock::MockProvider;
