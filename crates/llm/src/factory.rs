//! LLM provider factory.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use docseek_core::config::GenerationSettings;
use docseek_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client from the generation settings.
///
/// # Errors
/// * `AppError::Config` - If the provider is unknown or its client cannot be built
pub fn create_client(settings: &GenerationSettings) -> AppResult<Arc<dyn LlmClient>> {
    match settings.provider.to_lowercase().as_str() {
        "ollama" => {
            let timeout = Duration::from_secs(settings.timeout_secs);
            let client = OllamaClient::with_base_url(&settings.endpoint, timeout)?;
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!(
            "Unknown LLM provider: {}",
            settings.provider
        ))),
    }
}
