//! Abstractions for generating abstractive answers via remote language models.
//!
//! Summarization is optional; when no provider is configured the pipeline only offers extractive
//! answers. Two providers are supported: any OpenAI-compatible chat completions endpoint (the
//! default points at Hyperbolic) and a local Ollama runtime. Both clients issue HTTP requests
//! directly with `reqwest`.

use crate::config::{Config, DEFAULT_SUMMARIZATION_URL, SummarizationProvider};
use crate::processing::SearchResult;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Errors surfaced while attempting abstractive summarization.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Provider is disabled or lacks a credential.
    #[error("Summarization is not configured: {0}")]
    NotConfigured(String),
    /// Provider could not be reached.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled from the question and retrieved context.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Interface implemented by abstractive summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Generate an answer for the prompt using the requested model.
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError>;
}

/// Assemble the prompt sent to the language model.
///
/// Each result contributes a `(Page N) text` paragraph to the context block.
pub fn build_prompt(question: &str, results: &[SearchResult]) -> String {
    let context = results
        .iter()
        .map(|result| format!("(Page {}) {}", result.page, result.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are a financial policy assistant.\n\
         Use the context below to answer the user's question.\n\
         Always cite page numbers when relevant.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\
         Answer:"
    )
}

/// Build a summarization client based on configuration.
///
/// Fails with [`SummarizationClientError::NotConfigured`] when the provider is disabled or the
/// OpenAI-compatible provider has no API key.
pub fn get_summarization_client(
    config: &Config,
) -> Result<Box<dyn SummarizationClient>, SummarizationClientError> {
    match config.summarization_provider {
        SummarizationProvider::None => Err(SummarizationClientError::NotConfigured(
            "SUMMARIZATION_PROVIDER is 'none'".into(),
        )),
        SummarizationProvider::OpenAI => {
            let api_key = config.summarization_api_key.clone().ok_or_else(|| {
                SummarizationClientError::NotConfigured(
                    "set SUMMARIZATION_API_KEY or HYPERBOLIC_API_KEY".into(),
                )
            })?;
            let url = config
                .summarization_url
                .clone()
                .unwrap_or_else(|| DEFAULT_SUMMARIZATION_URL.to_string());
            Ok(Box::new(ChatCompletionsClient::new(url, api_key)))
        }
        SummarizationProvider::Ollama => {
            let base_url = config
                .summarization_url
                .clone()
                .or_else(|| config.ollama_url.clone())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Box::new(OllamaSummarizationClient::new(base_url)))
        }
    }
}

fn http_client() -> Client {
    Client::builder()
        .user_agent("docqa/summary")
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    http: Client,
    url: String,
    api_key: String,
}

impl ChatCompletionsClient {
    /// Client posting to the full completions `url` with bearer `api_key`.
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            http: http_client(),
            url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SummarizationClient for ChatCompletionsClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": request.prompt},
            ],
            "max_tokens": request.max_tokens,
            "temperature": 0.7,
            "top_p": 0.8,
            "stream": false,
        });

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode completion: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                SummarizationClientError::InvalidResponse("completion had no content".into())
            })
    }
}

/// Client for the Ollama `/api/generate` endpoint.
pub struct OllamaSummarizationClient {
    http: Client,
    base_url: String,
}

impl OllamaSummarizationClient {
    /// Client for the Ollama runtime at `base_url`.
    pub fn new(base_url: String) -> Self {
        Self {
            http: http_client(),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": request.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SummarizationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(SummarizationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
