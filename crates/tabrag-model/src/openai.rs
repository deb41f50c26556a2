//! OpenAI-compatible HTTP client for embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tabrag_core::{Embedder, LanguageModel, ModelConfig, RagError, Result};

const EMBEDDING_SERVICE: &str = "embedding";
const CHAT_SERVICE: &str = "chat";

/// Client for an OpenAI-compatible endpoint.
///
/// Embeddings go to `POST {endpoint}/v1/embeddings`, completions to
/// `POST {endpoint}/v1/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimensions: usize,
    temperature: f32,
    max_tokens: u32,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Build a client from model settings.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(RagError::config("model.dimensions must be greater than 0"));
        }
        if config.batch_size == 0 {
            return Err(RagError::config("model.batch_size must be greater than 0"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::config(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Model service at {} (embedding: {}, chat: {})",
            config.endpoint, config.embedding_model, config.chat_model
        );

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            dimensions: config.dimensions,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            batch_size: config.batch_size,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        service: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let res = request
            .send()
            .await
            .map_err(|e| RagError::service(service, e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::service(
                service,
                format!("HTTP {}: {}", status, text.trim()),
            ));
        }

        res.json()
            .await
            .map_err(|e| RagError::service(service, format!("Malformed response: {}", e)))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response: EmbeddingResponse =
            Self::send(EMBEDDING_SERVICE, self.post("/v1/embeddings").json(&body)).await?;

        if response.data.len() != texts.len() {
            return Err(RagError::service(
                EMBEDDING_SERVICE,
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.data.len()
                ),
            ));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        data.into_iter()
            .map(|d| truncate_embedding(d.embedding, self.dimensions))
            .collect()
    }
}

/// Keep the first `dimensions` components of an embedding.
fn truncate_embedding(mut embedding: Vec<f32>, dimensions: usize) -> Result<Vec<f32>> {
    if embedding.len() < dimensions {
        return Err(RagError::service(
            EMBEDDING_SERVICE,
            format!(
                "embedding has {} dimensions, expected at least {}",
                embedding.len(),
                dimensions
            ),
        ));
    }
    embedding.truncate(dimensions);
    Ok(embedding)
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch).await?);
            debug!("Embedded {}/{} texts", embeddings.len(), texts.len());
        }

        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| RagError::service(EMBEDDING_SERVICE, "empty embedding response"))
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response: ChatResponse =
            Self::send(CHAT_SERVICE, self.post("/v1/chat/completions").json(&body)).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::service(CHAT_SERVICE, "response has no message content"))?;

        debug!("Completion of {} chars from {}", text.len(), self.chat_model);
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}
