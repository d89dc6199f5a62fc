//! Batch ingestion: embed and upsert pages in bounded batches.
//!
//! Identities are positional. The page at position `p` of the submitted
//! sequence gets identity `start_offset + p`, whatever the batch size, so a
//! run over N pages produces exactly `start_offset..start_offset + N`.

use crate::cancel::CancellationToken;
use crate::collection::{CollectionManager, CollectionRequest, CollectionState, WriterGuard};
use crate::embeddings::{page_issue, validate_batch_output, EmbeddingProvider};
use crate::progress::ProgressReporter;
use crate::store::VectorStore;
use crate::timeouts::Timeouts;
use crate::types::{IndexEntry, MultiVector, PageId, PageItem};
use docseek_core::{AppError, AppResult};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-run ingestion options.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Pages per embedding call
    pub batch_size: usize,

    /// Payload `source` tag applied to every entry
    pub source: String,

    /// Identity of the first submitted page
    pub start_offset: u64,

    /// Layout used when the collection has to be created
    pub collection: CollectionRequest,

    pub cancel: Option<CancellationToken>,

    pub progress: ProgressReporter,
}

impl IndexOptions {
    pub fn new(batch_size: usize, source: impl Into<String>, collection: CollectionRequest) -> Self {
        Self {
            batch_size,
            source: source.into(),
            start_offset: 0,
            collection,
            cancel: None,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// A page left out of the run for missing required fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    /// Identity reserved for the page; nothing is stored under it
    pub identity: PageId,
    pub source_filename: String,
    pub reason: String,
}

/// The batch that stopped a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Zero-based batch number within the run
    pub batch_index: usize,
    pub first_identity: PageId,
    pub len: usize,
    pub reason: String,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestionOutcome {
    Completed,
    /// Stopped at a batch boundary on request
    Cancelled,
    Failed(BatchFailure),
}

/// Summary of one `index` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionReport {
    pub start_offset: u64,
    pub items_total: usize,
    pub batches_attempted: usize,
    pub batches_upserted: usize,
    pub items_indexed: usize,
    pub skipped: Vec<SkippedItem>,
    /// Identities stored by this run, ascending
    pub identities: Vec<PageId>,
    /// First identity not covered by a completed batch
    pub next_offset: u64,
    pub outcome: IngestionOutcome,
    pub duration_secs: f64,
}

impl IngestionReport {
    fn empty(start_offset: u64, items_total: usize) -> Self {
        Self {
            start_offset,
            items_total,
            batches_attempted: 0,
            batches_upserted: 0,
            items_indexed: 0,
            skipped: Vec::new(),
            identities: Vec::new(),
            next_offset: start_offset,
            outcome: IngestionOutcome::Completed,
            duration_secs: 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == IngestionOutcome::Completed
    }
}

/// Drives the embed-then-upsert pipeline for one collection.
pub struct BatchIngestor {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    manager: Arc<CollectionManager>,
    timeouts: Timeouts,
}

impl BatchIngestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        manager: Arc<CollectionManager>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            provider,
            manager,
            timeouts,
        }
    }

    /// Index `items`, creating the collection on demand.
    ///
    /// Batches run strictly in order. A provider failure, malformed provider
    /// output or a timed-out call stops the run and is recorded in the
    /// report; batches already stored stay stored. Configuration errors and
    /// store transport errors are returned as `Err`.
    pub async fn index(&self, items: &[PageItem], options: &IndexOptions) -> AppResult<IngestionReport> {
        let guard = self.manager.lock_writer().await;
        self.run(&guard, items, options).await
    }

    #[instrument(skip_all, fields(collection = %self.manager.name(), items = items.len(), start_offset = options.start_offset))]
    pub(crate) async fn run(
        &self,
        guard: &WriterGuard<'_>,
        items: &[PageItem],
        options: &IndexOptions,
    ) -> AppResult<IngestionReport> {
        let start = Instant::now();

        if options.batch_size == 0 {
            return Err(AppError::Config("Batch size must be positive".to_string()));
        }

        let sample = items.iter().find(|item| self.issue(item).is_none());
        if !matches!(self.manager.state().await, CollectionState::Ready(_)) {
            if let Some(sample) = sample {
                options.progress.sample(&sample.source_filename);
            }
        }
        let handle = self
            .manager
            .ensure_locked(guard, &options.collection, sample)
            .await?;

        let mut report = IngestionReport::empty(options.start_offset, items.len());
        let total = items.len() as u64;
        let mut consumed = 0usize;

        for (batch_index, batch) in items.chunks(options.batch_size).enumerate() {
            if options.is_cancelled() {
                info!("Ingestion cancelled before batch {}", batch_index);
                report.outcome = IngestionOutcome::Cancelled;
                break;
            }

            let base_offset = options.start_offset + consumed as u64;

            let mut valid: Vec<(PageId, &PageItem)> = Vec::with_capacity(batch.len());
            for (position, item) in batch.iter().enumerate() {
                let identity = PageId(base_offset + position as u64);
                match self.issue(item) {
                    None => valid.push((identity, item)),
                    Some(reason) => {
                        warn!("Skipping page {} ({}): {}", identity, item.source_filename, reason);
                        report.skipped.push(SkippedItem {
                            identity,
                            source_filename: item.source_filename.clone(),
                            reason,
                        });
                    }
                }
            }

            if valid.is_empty() {
                consumed += batch.len();
                continue;
            }

            report.batches_attempted += 1;
            options.progress.embed(consumed as u64, total, valid.len());

            let pages: Cow<'_, [PageItem]> = if valid.len() == batch.len() {
                Cow::Borrowed(batch)
            } else {
                Cow::Owned(valid.iter().map(|(_, item)| (*item).clone()).collect())
            };

            let vectors = match self.embed_batch(&pages).await {
                Ok(vectors) => vectors,
                Err(reason) => {
                    report.outcome = self.fail(batch_index, base_offset, batch.len(), reason);
                    break;
                }
            };

            let mut entries = Vec::with_capacity(valid.len());
            for ((identity, item), vectors) in valid.into_iter().zip(vectors) {
                handle.config.check_dimension(identity, &vectors)?;
                entries.push(IndexEntry {
                    identity,
                    vectors,
                    payload: item.payload(&options.source),
                });
            }
            let identities: Vec<PageId> = entries.iter().map(|e| e.identity).collect();
            let stored = identities.len();

            match self
                .timeouts
                .bound_store(self.store.upsert(&handle.name, entries))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        "Upsert of batch {} failed after {} stored batches: {}",
                        batch_index, report.batches_upserted, e
                    );
                    return Err(e);
                }
                Err(elapsed) => {
                    report.outcome =
                        self.fail(batch_index, base_offset, batch.len(), elapsed.to_string());
                    break;
                }
            }

            consumed += batch.len();
            report.batches_upserted += 1;
            report.items_indexed += stored;
            report.identities.extend(identities);
            options.progress.upsert(consumed as u64, total, &handle.name);

            debug!(
                "Stored batch {} ({} pages starting at {})",
                batch_index, stored, base_offset
            );
        }

        report.next_offset = options.start_offset + consumed as u64;
        report.duration_secs = start.elapsed().as_secs_f64();

        info!(
            "Ingestion finished: {} pages indexed in {} batches, {} skipped, {:.2}s",
            report.items_indexed,
            report.batches_upserted,
            report.skipped.len(),
            report.duration_secs
        );

        Ok(report)
    }

    fn issue(&self, item: &PageItem) -> Option<String> {
        page_issue(self.provider.as_ref(), item)
    }

    /// One provider call for the whole batch; any failure is a batch failure.
    async fn embed_batch(&self, pages: &[PageItem]) -> Result<Vec<MultiVector>, String> {
        let vectors = match self.timeouts.bound_embed(self.provider.embed_items(pages)).await {
            Ok(Ok(vectors)) => vectors,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(elapsed) => return Err(elapsed.to_string()),
        };

        validate_batch_output(pages.len(), &vectors).map_err(|e| e.to_string())?;
        Ok(vectors)
    }

    fn fail(&self, batch_index: usize, base_offset: u64, len: usize, reason: String) -> IngestionOutcome {
        warn!("Batch {} failed: {}", batch_index, reason);
        IngestionOutcome::Failed(BatchFailure {
            batch_index,
            first_identity: PageId(base_offset),
            len,
            reason,
        })
    }
}
