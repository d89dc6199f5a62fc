//! Index command handler.
//!
//! Full ingestion of a page set, creating the collection on demand.

use super::pages::{cancel_on_ctrl_c, finish, progress_reporter, PageSourceArgs};
use clap::Args;
use docseek_core::{config::AppConfig, AppResult};
use docseek_retrieval::DocumentIndex;

/// Index all pages of a directory or manifest
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(flatten)]
    pub pages: PageSourceArgs,

    /// Pages per embedding call (default: from config)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Payload source tag (default: from config)
    #[arg(long)]
    pub source: Option<String>,

    /// Drop and re-create the collection first (destroys existing entries)
    #[arg(long)]
    pub replace: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index command");

        let mut config = config.clone();
        if self.replace {
            config.indexing.allow_replace = true;
        }
        if let Some(batch_size) = self.batch_size {
            config.indexing.batch_size = batch_size;
        }
        if let Some(source) = &self.source {
            config.indexing.source = source.clone();
        }

        let items = self.pages.load(&config)?;
        let index = DocumentIndex::from_config(&config)?;

        if self.replace {
            let handle = index.recreate_collection(index.first_indexable(&items)).await?;
            tracing::info!(
                "Re-created collection '{}' with dimension {}",
                handle.name,
                handle.config.dimension
            );
        }

        let options = index
            .index_options()
            .with_cancel(cancel_on_ctrl_c())
            .with_progress(progress_reporter(self.json));

        let report = index.index(&items, &options).await?;
        finish(&report, self.json)
    }
}
