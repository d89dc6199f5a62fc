//! Page loading and ingestion plumbing shared by commands.

use clap::Args;
use docseek_core::{config::AppConfig, AppError, AppResult};
use docseek_retrieval::{
    discover_pages, load_manifest, CancellationToken, IngestionOutcome, IngestionReport,
    PageFilter, PageItem, ProgressReporter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where pages come from
#[derive(Args, Debug, Clone, Default)]
pub struct PageSourceArgs {
    /// Directory of rendered pages (default: configured data directory)
    pub dir: Option<PathBuf>,

    /// JSON-lines manifest of pages instead of a directory
    #[arg(long, conflicts_with = "dir")]
    pub manifest: Option<PathBuf>,

    /// Minimum page width in pixels
    #[arg(long)]
    pub min_width: Option<u32>,

    /// Maximum page width in pixels
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Minimum page height in pixels
    #[arg(long)]
    pub min_height: Option<u32>,

    /// Maximum page height in pixels
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Only pages with this page number
    #[arg(long)]
    pub page_number: Option<u32>,
}

impl PageSourceArgs {
    pub fn filter(&self) -> PageFilter {
        PageFilter {
            min_width: self.min_width,
            max_width: self.max_width,
            min_height: self.min_height,
            max_height: self.max_height,
            page_number: self.page_number,
        }
    }

    /// Load pages in the stable order used for identity assignment.
    pub fn load(&self, config: &AppConfig) -> AppResult<Vec<PageItem>> {
        let filter = self.filter();

        let pages = match &self.manifest {
            Some(manifest) => {
                let pages = load_manifest(&resolve(config, manifest))?;
                if filter.is_empty() {
                    pages
                } else {
                    pages.into_iter().filter(|p| filter.matches(p)).collect()
                }
            }
            None => {
                let dir = match &self.dir {
                    Some(dir) => resolve(config, dir),
                    None => config.data_directory(),
                };
                discover_pages(&dir, &filter)?
            }
        };

        tracing::info!("Loaded {} pages", pages.len());
        Ok(pages)
    }
}

fn resolve(config: &AppConfig, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config.workspace.join(path)
    }
}

/// Token cancelled by the first Ctrl-C; the run stops after its current batch.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            handle.cancel();
        }
    });

    token
}

/// Progress lines on stderr, silent for JSON output.
pub fn progress_reporter(json: bool) -> ProgressReporter {
    if json {
        ProgressReporter::noop()
    } else {
        ProgressReporter::new(Arc::new(|event| eprintln!("{}", event.format_simple())))
    }
}

/// Print a report and turn a failed run into an error exit.
pub fn finish(report: &IngestionReport, json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "Indexed {} pages in {} batches ({} skipped) in {:.2}s",
            report.items_indexed,
            report.batches_upserted,
            report.skipped.len(),
            report.duration_secs
        );
        for skipped in &report.skipped {
            println!("  skipped {} ({}): {}", skipped.identity, skipped.source_filename, skipped.reason);
        }
        if let IngestionOutcome::Cancelled = report.outcome {
            println!("Cancelled; resume with `docseek add` from page {}", report.next_offset);
        }
    }

    match &report.outcome {
        IngestionOutcome::Failed(failure) => Err(AppError::Other(format!(
            "Ingestion stopped at batch {} (pages from {}): {}",
            failure.batch_index, failure.first_identity, failure.reason
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_relative_to_workspace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("pages.jsonl"),
            "{\"source_filename\":\"a.pdf\",\"page_number\":1}\n{\"source_filename\":\"b.pdf\",\"page_number\":2}\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.workspace = temp.path().to_path_buf();

        let args = PageSourceArgs {
            manifest: Some(PathBuf::from("pages.jsonl")),
            page_number: Some(2),
            ..Default::default()
        };

        let pages = args.load(&config).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source_filename, "b.pdf");
    }

    #[test]
    fn test_missing_data_directory() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.workspace = temp.path().to_path_buf();

        let result = PageSourceArgs::default().load(&config);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
