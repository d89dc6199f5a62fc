//! Ask command handler.

use super::pages::PageSourceArgs;
use clap::Args;
use docseek_core::{config::AppConfig, AppResult};
use docseek_retrieval::{Answerer, DocumentIndex};

/// Answer a question from the best-matching pages
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Question to answer
    pub query: String,

    /// Number of pages to retrieve before answering
    #[arg(short = 'k', long, allow_negative_numbers = true)]
    pub top_k: Option<i64>,

    /// Pages handed to the model (default: generation.pages)
    #[arg(long)]
    pub pages_to_read: Option<usize>,

    /// Model override (default: generation.model)
    #[arg(long)]
    pub model: Option<String>,

    #[command(flatten)]
    pub pages: PageSourceArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let mut config = config.clone();
        if let Some(pages) = self.pages_to_read {
            config.generation.pages = pages;
        }
        if let Some(model) = &self.model {
            config.generation.model = model.clone();
        }
        config.validate()?;

        let top_k = self
            .top_k
            .unwrap_or(config.search.default_top_k as i64);
        let index = DocumentIndex::from_config(&config)?;
        let answerer = Answerer::from_config(&config)?;

        let items = self.pages.load(&config)?;
        let hits = index.search_and_resolve(&self.query, top_k, &items).await?;
        let answer = answerer.answer(&self.query, &hits).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
            return Ok(());
        }

        println!("{}", answer.answer);
        if !answer.pages.is_empty() {
            println!();
            println!("Read from:");
            for doc in &answer.pages {
                let page = doc
                    .page_number
                    .map(|n| format!(" (page {})", n))
                    .unwrap_or_default();
                println!("  #{} {}{}  {:.4}", doc.index, doc.filename, page, doc.score);
            }
        }

        Ok(())
    }
}
