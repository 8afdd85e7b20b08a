//! Native Ollama provider.
//!
//! Talks to `/api/generate` and `/api/embed` directly instead of the
//! OpenAI-compatible shim. Network failures and 5xx responses are retried
//! a bounded number of times with a linear backoff.

use crate::{HTTP_TIMEOUT, check_status, http_client, transport_error};
use async_trait::async_trait;
use cryslgen_core::error::ProviderError;
use cryslgen_core::message::{Message, flatten};
use cryslgen_core::provider::*;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(HTTP_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the retry policy. Attempt `n` (0-based) waits `backoff * (n + 1)`.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn generate_body(request: &ProviderRequest) -> serde_json::Value {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }
        serde_json::json!({
            "model": request.model,
            "prompt": flatten(&request.messages),
            "stream": false,
            "options": options,
        })
    }

    /// POST with retries on transport errors and 5xx.
    async fn post_with_retry(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0u32;
        loop {
            let outcome = self.client.post(&url).json(body).send().await;
            let retryable = match &outcome {
                Ok(resp) => resp.status().is_server_error(),
                Err(e) => !e.is_builder(),
            };

            if !retryable || attempt >= self.max_retries {
                let response = outcome.map_err(transport_error)?;
                return check_status("ollama", response).await;
            }

            match &outcome {
                Ok(resp) => warn!(path, attempt, status = resp.status().as_u16(), "Ollama request failed, retrying"),
                Err(e) => warn!(path, attempt, error = %e, "Ollama request failed, retrying"),
            }
            tokio::time::sleep(self.backoff * (attempt + 1)).await;
            attempt += 1;
        }
    }

    async fn get_tags(&self) -> Result<reqwest::Response, ProviderError> {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(transport_error)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model, "Sending Ollama generate request");

        let response = self
            .post_with_retry("/api/generate", &Self::generate_body(&request))
            .await?;
        let envelope: GenerateEnvelope = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("unrecognized generate response shape: {e}"))
        })?;

        let usage = envelope.usage();
        let text = envelope
            .into_text()
            .ok_or_else(|| ProviderError::InvalidResponse("Generate response has no text".into()))?;

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage,
            model: request.model,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(model = %request.model, count = request.inputs.len(), "Sending Ollama embed request");

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
        });
        let response = self.post_with_retry("/api/embed", &body).await?;
        let envelope: EmbedEnvelope = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("unrecognized embed response shape: {e}"))
        })?;

        Ok(EmbeddingResponse {
            embeddings: envelope.into_vectors(),
            model: request.model,
            usage: None,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.get_tags().await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(self.get_tags().await?.status().is_success())
    }
}

// --- Response envelopes ---

/// The shapes a generate endpoint has been seen to answer with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateEnvelope {
    Native {
        response: String,
        #[serde(default)]
        prompt_eval_count: Option<u32>,
        #[serde(default)]
        eval_count: Option<u32>,
    },
    Text { text: String },
    Result { result: String },
    Output { output: String },
    Choices { choices: Vec<GenerateChoice> },
}

#[derive(Debug, Deserialize)]
struct GenerateChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl GenerateEnvelope {
    fn usage(&self) -> Option<Usage> {
        match self {
            Self::Native {
                prompt_eval_count: Some(prompt),
                eval_count: Some(completion),
                ..
            } => Some(Usage {
                prompt_tokens: *prompt,
                completion_tokens: *completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        }
    }

    fn into_text(self) -> Option<String> {
        match self {
            Self::Native { response, .. } => Some(response),
            Self::Text { text } => Some(text),
            Self::Result { result } => Some(result),
            Self::Output { output } => Some(output),
            Self::Choices { choices } => {
                let first = choices.into_iter().next()?;
                first.message.and_then(|m| m.content).or(first.text)
            }
        }
    }
}

/// The shapes an embedding endpoint has been seen to answer with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedEnvelope {
    Batch { embeddings: Vec<Vec<f32>> },
    Single { embedding: Vec<f32> },
    Data { data: Vec<EmbeddingItem> },
    Items(Vec<EmbeddingItem>),
    Vectors(Vec<Vec<f32>>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl EmbedEnvelope {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Batch { embeddings } => embeddings,
            Self::Single { embedding } => vec![embedding],
            Self::Data { data } | Self::Items(data) => data.into_iter().map(|d| d.embedding).collect(),
            Self::Vectors(vectors) => vectors,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
