//! Add command handler.
//!
//! Incremental ingestion: only pages past the stored count are indexed.

use super::pages::{cancel_on_ctrl_c, finish, progress_reporter, PageSourceArgs};
use clap::Args;
use docseek_core::{config::AppConfig, AppResult};
use docseek_retrieval::DocumentIndex;

/// Index only pages added since the last run
#[derive(Args, Debug)]
pub struct AddCommand {
    #[command(flatten)]
    pub pages: PageSourceArgs,

    /// Pages per embedding call (default: from config)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Show what would be indexed without embedding anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AddCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing add command");

        let mut config = config.clone();
        if let Some(batch_size) = self.batch_size {
            config.indexing.batch_size = batch_size;
        }

        let items = self.pages.load(&config)?;
        let index = DocumentIndex::from_config(&config)?;

        if self.dry_run {
            let count = index.indexed_count().await?;
            let watermark = index.watermark().await?;
            let fresh = index.select_new(&items, watermark);

            if self.json {
                let output = serde_json::json!({
                    "indexed": count,
                    "watermark": watermark,
                    "candidates": items.len(),
                    "new": fresh.iter().map(|p| &p.source_filename).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{} pages indexed, {} new:", count, fresh.len());
                for page in fresh {
                    println!("  {}", page.source_filename);
                }
            }
            return Ok(());
        }

        let options = index
            .index_options()
            .with_cancel(cancel_on_ctrl_c())
            .with_progress(progress_reporter(self.json));

        let report = index.index_new(&items, &options).await?;
        finish(&report, self.json)
    }
}
