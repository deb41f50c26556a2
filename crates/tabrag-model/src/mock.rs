//! Deterministic in-process models for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use tabrag_core::{Embedder, LanguageModel, RagError, Result};

/// Mock embedder for testing.
///
/// Each lowercase word is hashed into one of `dimension` buckets and the
/// bucket counts are L2 normalized, so texts sharing words land close
/// together under cosine distance.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the default dimension (256).
    pub fn new() -> Self {
        Self { dimension: 256 }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) % self.dimension as u64;
            embedding[bucket as usize] += 1.0;
        }

        // L2 normalize; wordless text gets a fixed unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        } else {
            embedding[0] = 1.0;
        }
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock chat model that returns a canned reply and records every prompt.
pub struct MockLanguageModel {
    reply: String,
    fail: bool,
    prompts: Mutex<Vec<(String, String)>>,
}

impl MockLanguageModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every completion fails with a service error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    /// Recorded `(system, user)` prompts, oldest first.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts().pop()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system.to_string(), user.to_string()));
        }

        if self.fail {
            return Err(RagError::service("chat", "mock model unavailable"));
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.dimension(), 256);

        let texts = ["Hello world", "Rust is great"];
        let embeddings = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 256);

        // Check L2 normalization
        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = MockEmbedder::new();

        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_query("consistent input").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let embedder = MockEmbedder::with_dimension(64);

        let query = embedder.embed_query("cheap sedan").await.unwrap();
        let near = embedder.embed_query("Kia Forte cheap Sedan").await.unwrap();
        let far = embedder.embed_query("Ford Mustang fastback").await.unwrap();

        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text_is_unit_vector() {
        let embedder = MockEmbedder::with_dimension(8);
        let e = embedder.embed_query("").await.unwrap();
        assert_eq!(e[0], 1.0);
    }

    #[tokio::test]
    async fn test_mock_language_model_records_prompts() {
        let model = MockLanguageModel::new("42");

        assert_eq!(model.complete("sys", "question").await.unwrap(), "42");
        assert_eq!(
            model.last_prompt(),
            Some(("sys".to_string(), "question".to_string()))
        );
        assert_eq!(model.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_language_model() {
        let model = MockLanguageModel::failing();
        let err = model.complete("sys", "q").await.unwrap_err();
        assert_eq!(err.error_code(), "SERVICE_ERROR");
        assert_eq!(model.prompts().len(), 1);
    }
}
