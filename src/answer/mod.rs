//! Answer assembly strategies consuming retrieval results.
//!
//! [`ExtractiveAnswerGenerator`] cites the retrieved snippets directly and never fails.
//! [`SummarizingAnswerGenerator`] hands the question and snippets to a remote language model and
//! appends a source list; its call is bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::processing::SearchResult;
use crate::summarization::{
    SummarizationClient, SummarizationClientError, SummarizationRequest, build_prompt,
};

/// Answer returned when retrieval produced nothing.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the document.";

const SNIPPET_MAX_CHARS: usize = 300;

/// Errors raised while generating an answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Requested strategy cannot run in this process.
    #[error("Summarized answers are unavailable: {0}")]
    Unavailable(String),
    /// Summarization provider failed.
    #[error(transparent)]
    Summarization(#[from] SummarizationClientError),
    /// Summarization provider did not answer in time.
    #[error("Summarization timed out after {0:?}")]
    TimedOut(Duration),
}

/// Strategy turning a question and its retrieval results into answer text.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce the answer for `question` from `results`, which are ordered best first.
    async fn generate(&self, question: &str, results: &[SearchResult])
    -> Result<String, AnswerError>;
}

/// Formats each result as a truncated, cited snippet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveAnswerGenerator;

impl ExtractiveAnswerGenerator {
    /// Render the extractive answer.
    pub fn render(&self, question: &str, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return NO_RELEVANT_INFORMATION.to_string();
        }
        let mut lines = vec![format!("Q: {question}"), String::new(), "Top matches:".into()];
        lines.extend(results.iter().map(|result| {
            format!(
                "- (page {}, score {:.3}) {}",
                result.page,
                result.score,
                snippet(&result.text)
            )
        }));
        lines.join("\n")
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveAnswerGenerator {
    async fn generate(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<String, AnswerError> {
        Ok(self.render(question, results))
    }
}

fn snippet(text: &str) -> String {
    let flattened = text.trim().replace('\n', " ");
    match flattened.char_indices().nth(SNIPPET_MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &flattened[..cut]),
        None => flattened,
    }
}

/// Delegates to a [`SummarizationClient`] and appends the cited sources.
pub struct SummarizingAnswerGenerator {
    client: Arc<dyn SummarizationClient>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl SummarizingAnswerGenerator {
    /// Wrap `client`, requesting `model` with at most `max_tokens` and waiting at most `timeout`.
    pub fn new(
        client: Arc<dyn SummarizationClient>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }
}

#[async_trait]
impl AnswerGenerator for SummarizingAnswerGenerator {
    async fn generate(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<String, AnswerError> {
        if results.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        let request = SummarizationRequest {
            model: self.model.clone(),
            prompt: build_prompt(question, results),
            max_tokens: self.max_tokens,
        };
        let summary = tokio::time::timeout(self.timeout, self.client.generate_summary(request))
            .await
            .map_err(|_| AnswerError::TimedOut(self.timeout))??;

        let sources = results
            .iter()
            .map(|result| format!("- Page {}, score {:.3}", result.page, result.score))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("{summary}\n\n---\nSources:\n{sources}"))
    }
}
