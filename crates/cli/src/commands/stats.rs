//! Stats command handler.
//!
//! Shows the collection's layout and entry count.

use clap::Args;
use docseek_core::{config::AppConfig, AppResult};
use docseek_retrieval::DocumentIndex;

/// Show collection configuration and size
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let index = DocumentIndex::from_config(config)?;
        let stats = index.stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Collection: {}", stats.name);
        println!("Backend:    {}", stats.backend);
        println!("Embeddings: {} ({})", stats.provider, stats.model);
        println!("State:      {}", stats.state);

        match (&stats.config, stats.count) {
            (Some(layout), Some(count)) => {
                println!("Dimension:  {}", layout.dimension);
                println!("Distance:   {}", layout.distance);
                match &layout.quantization {
                    Some(q) => println!(
                        "Quantized:  int{} (quantile {}, always_ram {})",
                        q.bits, q.quantile, q.always_ram
                    ),
                    None => println!("Quantized:  no"),
                }
                println!("Pages:      {}", count);
            }
            _ => println!("Collection does not exist yet; run `docseek index`"),
        }

        Ok(())
    }
}
