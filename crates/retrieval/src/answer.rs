//! Answers a question from the best-matching page renders.
//!
//! The top resolved hits are read from disk and handed to a vision LLM
//! together with the question. Retrieval decides which pages are seen;
//! the model only ever reads those pages.

use crate::query::{PageDocument, ResolvedHit};
use docseek_core::config::GenerationSettings;
use docseek_core::{AppConfig, AppError, AppResult};
use docseek_llm::{create_client, LlmClient, LlmRequest, LlmUsage};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Reply used when retrieval found nothing to read.
pub const NO_PAGES_ANSWER: &str = "I could not find any page that answers this question.";

const SYSTEM_PROMPT: &str = "You answer questions about scanned document pages.\n\
     - Answer only from what is visible on the pages provided\n\
     - Quote figures and labels exactly as printed\n\
     - If the pages do not contain the answer, say so plainly";

/// A generated answer and the pages it was read from.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub pages: Vec<PageDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

impl Answer {
    pub fn no_information(query: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: NO_PAGES_ANSWER.to_string(),
            model: None,
            pages: Vec::new(),
            usage: None,
        }
    }
}

pub struct Answerer {
    client: Arc<dyn LlmClient>,
    settings: GenerationSettings,
}

impl Answerer {
    pub fn new(client: Arc<dyn LlmClient>, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = create_client(&config.generation)?;
        debug!(
            "Using {} for answers ({})",
            client.provider_name(),
            config.generation.model
        );
        Ok(Self::new(client, config.generation.clone()))
    }

    /// Answer `query` from the highest-ranked hits that have an image.
    ///
    /// At most `pages` hits are read, in rank order. Hits without an image
    /// are passed over.
    ///
    /// # Errors
    /// * `AppError::Config` - Hits were found but none has an image
    /// * `AppError::Io` - A page image cannot be read
    /// * `AppError::Llm` - The runtime failed or timed out
    #[instrument(skip(self, hits), fields(hits = hits.len()))]
    pub async fn answer(&self, query: &str, hits: &[ResolvedHit<'_>]) -> AppResult<Answer> {
        if hits.is_empty() {
            info!("No pages retrieved; nothing to answer from");
            return Ok(Answer::no_information(query));
        }

        let chosen: Vec<_> = hits
            .iter()
            .filter_map(|hit| hit.item.image_path.as_ref().map(|path| (hit, path)))
            .take(self.settings.pages)
            .collect();

        if chosen.is_empty() {
            return Err(AppError::Config(format!(
                "None of the {} retrieved pages has an image to answer from",
                hits.len()
            )));
        }

        let mut request = LlmRequest::new(build_prompt(query, chosen.len()), &self.settings.model)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(0.2);

        let mut pages = Vec::with_capacity(chosen.len());
        for (hit, path) in chosen {
            debug!("Reading page image {:?}", path);
            let bytes = tokio::fs::read(path).await?;
            request = request.with_image_bytes(&bytes);
            pages.push(hit.to_document());
        }

        let response = self.client.complete(&request).await?;
        info!(
            "Answered from {} page(s) using {} tokens",
            pages.len(),
            response.usage.total_tokens
        );

        Ok(Answer {
            query: query.to_string(),
            answer: response.content.trim().to_string(),
            model: Some(response.model),
            pages,
            usage: Some(response.usage),
        })
    }
}

fn build_prompt(query: &str, page_count: usize) -> String {
    let pages = if page_count == 1 {
        "the attached page".to_string()
    } else {
        format!("the {} attached pages", page_count)
    };
    format!("Using {}, answer the question.\n\nQuestion: {}", pages, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageId, PageItem};
    use docseek_llm::LlmResponse;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every request and replies with a fixed answer.
    struct RecordingClient {
        requests: Mutex<Vec<LlmRequest>>,
        fail: bool,
    }

    impl RecordingClient {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for RecordingClient {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(AppError::Llm("model not loaded".into()));
            }
            Ok(LlmResponse {
                content: "  Nickel output fell 4%.\n".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(640, 8),
                done: true,
            })
        }
    }

    fn page(dir: &Path, name: &str, bytes: &[u8]) -> PageItem {
        let path = dir.join(format!("{}_page_1.png", name));
        std::fs::write(&path, bytes).unwrap();
        PageItem::new(format!("{}.pdf", name))
            .with_page_number(1)
            .with_image_path(path)
    }

    fn hits(items: &[PageItem]) -> Vec<ResolvedHit<'_>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| ResolvedHit {
                identity: PageId(i as u64),
                score: 10.0 - i as f32,
                item,
            })
            .collect()
    }

    fn answerer(client: Arc<RecordingClient>, pages: usize) -> Answerer {
        let settings = GenerationSettings {
            pages,
            ..GenerationSettings::default()
        };
        Answerer::new(client, settings)
    }

    #[tokio::test]
    async fn test_no_hits_answers_without_calling_model() {
        let client = Arc::new(RecordingClient::new());
        let answer = answerer(client.clone(), 1)
            .answer("nickel output", &[])
            .await
            .unwrap();

        assert_eq!(answer.answer, NO_PAGES_ANSWER);
        assert!(answer.pages.is_empty());
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_top_page_image_sent_with_question() {
        let temp = TempDir::new().unwrap();
        let items = vec![
            page(temp.path(), "smelter", b"abc"),
            page(temp.path(), "outlook", b"xyz"),
        ];
        let client = Arc::new(RecordingClient::new());

        let answer = answerer(client.clone(), 1)
            .answer("How did nickel output change?", &hits(&items))
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].images, vec!["YWJj".to_string()]);
        assert_eq!(requests[0].model, "minicpm-v");
        assert_eq!(requests[0].max_tokens, Some(2048));
        assert!(requests[0].prompt.contains("How did nickel output change?"));

        assert_eq!(answer.answer, "Nickel output fell 4%.");
        assert_eq!(answer.pages.len(), 1);
        assert_eq!(answer.pages[0].filename, "smelter.pdf");
        assert_eq!(answer.usage.map(|u| u.total_tokens), Some(648));
    }

    #[tokio::test]
    async fn test_pages_without_image_passed_over() {
        let temp = TempDir::new().unwrap();
        let items = vec![
            PageItem::new("text_only.pdf").with_text("no render"),
            page(temp.path(), "smelter", b"abc"),
            page(temp.path(), "outlook", b"xyz"),
        ];
        let client = Arc::new(RecordingClient::new());

        let answer = answerer(client.clone(), 2)
            .answer("nickel", &hits(&items))
            .await
            .unwrap();

        let filenames: Vec<_> = answer.pages.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(filenames, vec!["smelter.pdf", "outlook.pdf"]);
        assert_eq!(client.requests()[0].images.len(), 2);
        assert!(client.requests()[0].prompt.contains("the 2 attached pages"));
    }

    #[tokio::test]
    async fn test_hits_without_any_image_is_config_error() {
        let items = vec![PageItem::new("text_only.pdf")];
        let client = Arc::new(RecordingClient::new());

        let result = answerer(client.clone(), 1).answer("nickel", &hits(&items)).await;

        assert!(matches!(result, Err(AppError::Config(_))));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_file_is_io_error() {
        let items = vec![PageItem::new("gone.pdf").with_image_path("/nonexistent/gone_page_1.png")];
        let client = Arc::new(RecordingClient::new());

        let result = answerer(client.clone(), 1).answer("nickel", &hits(&items)).await;

        assert!(matches!(result, Err(AppError::Io(_))));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let temp = TempDir::new().unwrap();
        let items = vec![page(temp.path(), "smelter", b"abc")];

        let result = answerer(Arc::new(RecordingClient::failing()), 1)
            .answer("nickel", &hits(&items))
            .await;

        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
