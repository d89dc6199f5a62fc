//! Docseek CLI
//!
//! Main entry point for the docseek command-line tool.
//! Indexes rendered document pages as multi-vectors, searches them by text
//! and answers questions from the best-matching pages.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AddCommand, AskCommand, IndexCommand, SearchCommand, StatsCommand};
use docseek_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Docseek - multi-vector page indexing and retrieval
#[derive(Parser, Debug)]
#[command(name = "docseek")]
#[command(about = "Multi-vector page indexing and retrieval", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCSEEK_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCSEEK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Collection name
    #[arg(long, global = true, env = "DOCSEEK_COLLECTION")]
    collection: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index all pages of a directory or manifest
    Index(IndexCommand),

    /// Index only pages added since the last run
    Add(AddCommand),

    /// Search pages by text
    Search(SearchCommand),

    /// Answer a question from the best-matching pages
    Ask(AskCommand),

    /// Show collection configuration and size
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?;

    let config = config.with_overrides(
        cli.workspace,
        cli.collection,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    config.validate()?;

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Docseek CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Store: {} at {} (collection '{}')",
        config.store.backend,
        config.store.url,
        config.store.collection
    );

    config.ensure_docseek_dir()?;

    let command_name = match &cli.command {
        Commands::Index(_) => "index",
        Commands::Add(_) => "add",
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Add(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed ({:?}): {}", e.category(), e),
    }

    result
}
