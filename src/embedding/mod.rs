//! Text-to-vector embedding capability.
//!
//! Provides the [`Embedder`] trait and an HTTP implementation for
//! OpenAI-compatible `/embeddings` endpoints (Ollama, OpenAI, vLLM). The
//! embedder is optional: [`create_embedder`] returns `None` when the
//! configured provider is `"none"`, and callers degrade to non-semantic
//! behavior.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;

/// Turns texts into vectors.
///
/// Must return exactly one vector per input, in input order. Any error is a
/// total failure for the call; callers never see partial output.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the model producing the vectors, recorded alongside them.
    fn model(&self) -> &str;
}

/// Create an embedder from config. `Ok(None)` means "run without embeddings".
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "openai" | "ollama" => {
            let embedder = openai::OpenAiCompatEmbedder::new(config)?;
            Ok(Some(Arc::new(embedder)))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: none, openai, ollama"),
    }
}
