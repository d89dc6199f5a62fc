//! Search command handler.

use super::pages::PageSourceArgs;
use clap::Args;
use docseek_core::{config::AppConfig, AppResult};
use docseek_retrieval::{DocumentIndex, PageDocument};

/// Search pages by text
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of pages to return (default: from config, clamped to max_top_k)
    #[arg(short = 'k', long, allow_negative_numbers = true)]
    pub top_k: Option<i64>,

    /// Print identities and scores without loading pages
    #[arg(long)]
    pub ids_only: bool,

    #[command(flatten)]
    pub pages: PageSourceArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let top_k = self
            .top_k
            .unwrap_or(config.search.default_top_k as i64);
        let index = DocumentIndex::from_config(config)?;

        if self.ids_only {
            let results = index.search(&self.query, top_k).await?;
            if self.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    let filename = result
                        .payload
                        .as_ref()
                        .map(|p| p.source_filename.as_str())
                        .unwrap_or("-");
                    println!("{:>6}  {:.4}  {}", result.identity, result.score, filename);
                }
            }
            return Ok(());
        }

        let items = self.pages.load(config)?;
        let hits = index.search_and_resolve(&self.query, top_k, &items).await?;
        let documents: Vec<PageDocument> = hits.iter().map(|h| h.to_document()).collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
        } else if documents.is_empty() {
            println!("No matching pages");
        } else {
            for doc in &documents {
                let page = doc
                    .page_number
                    .map(|n| format!(" (page {})", n))
                    .unwrap_or_default();
                println!("{:.4}  #{} {}{}", doc.score, doc.index, doc.filename, page);
            }
        }

        Ok(())
    }
}
