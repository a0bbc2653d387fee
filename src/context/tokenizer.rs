//! Token counting for context budgets.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Counts tokens in a piece of text. Used only for budget accounting.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Roughly four characters per token for English text and source code.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact counts from a HuggingFace `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        anyhow::ensure!(path.exists(), "tokenizer not found at {}", path.display());

        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tracing::info!(tokenizer = %path.display(), "tokenizer loaded");
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn count(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!(error = %e, "tokenization failed, estimating");
                HeuristicTokenizer.count(text)
            }
        }
    }
}

/// `"heuristic"` (or empty) selects [`HeuristicTokenizer`]; anything else is
/// treated as a path to a `tokenizer.json`.
pub fn create_tokenizer(setting: &str) -> Result<Arc<dyn Tokenizer>> {
    match setting.trim() {
        "" | "heuristic" => Ok(Arc::new(HeuristicTokenizer)),
        path => {
            let tokenizer = HfTokenizer::from_file(crate::config::expand_tilde(path))
                .with_context(|| format!("invalid tokenizer setting {path:?}"))?;
            Ok(Arc::new(tokenizer))
        }
    }
}
