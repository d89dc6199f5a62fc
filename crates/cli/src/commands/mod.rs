//! Command handlers for the docseek CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod add;
pub mod ask;
pub mod index;
pub mod pages;
pub mod search;
pub mod stats;

pub use add::AddCommand;
pub use ask::AskCommand;
pub use index::IndexCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;
