//! tabrag-model - Embedding and chat completion clients
//!
//! This crate talks to an OpenAI-compatible HTTP service (Ollama, LM Studio,
//! vLLM, OpenAI itself) for two things:
//!
//! - text embeddings, truncated to the configured dimension
//! - single-turn chat completions under a system instruction
//!
//! Deterministic in-process stand-ins are provided for tests.

mod mock;
mod openai;

pub use mock::{MockEmbedder, MockLanguageModel};
pub use openai::OpenAiClient;

// Re-export the service traits for convenience
pub use tabrag_core::{Embedder, LanguageModel};
