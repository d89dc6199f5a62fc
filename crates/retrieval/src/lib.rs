//! Multi-vector page indexing and retrieval.
//!
//! Pages are embedded as variable-count sets of vectors, stored in batches
//! under dense positional identities and searched with MaxSim scoring.
//! The best-matching pages can be handed to a vision LLM to answer a question.

pub mod answer;
pub mod cancel;
pub mod collection;
pub mod embeddings;
pub mod engine;
pub mod ingest;
pub mod progress;
pub mod query;
pub mod scoring;
pub mod source;
pub mod store;
pub mod timeouts;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod tests;

pub use answer::{Answer, Answerer};
pub use cancel::CancellationToken;
pub use collection::{CollectionHandle, CollectionManager, CollectionRequest, CollectionState};
pub use engine::{CollectionStats, DocumentIndex, EngineSettings};
pub use ingest::{
    BatchFailure, BatchIngestor, IndexOptions, IngestionOutcome, IngestionReport, SkippedItem,
};
pub use progress::{ProgressEvent, ProgressReporter};
pub use query::{PageDocument, QueryEngine, ResolvedHit};
pub use source::{discover_pages, load_manifest, PageFilter};
pub use timeouts::Timeouts;
pub use tracker::{select_new, IncrementalTracker};
pub use types::{
    CollectionConfig, Distance, EntryPayload, IndexEntry, MultiVector, PageId, PageItem,
    ScalarQuantization, SearchResult,
};
