//! Token-budgeted context assembly.
//!
//! The system prompt carries the project profile plus every convention and
//! constraint and is never budgeted. The body is composed in priority order:
//!
//! 1. decisions, always
//! 2. the most recent sessions, newest first (skipped when `top_k_sessions == 0`)
//! 3. retrieved chunks and memories in ranker order
//! 4. explicitly requested files
//!
//! Steps 2 and 3 check the budget before each item. The first item that would
//! overflow closes its category (for step 3, its kind) and later ones are still
//! attempted.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::VaultConfig;
use crate::context::formatter::Formatter;
use crate::context::tokenizer::Tokenizer;
use crate::error::Result;
use crate::memory::orchestrator::{Degradation, RetrieveOptions, Retriever};
use crate::memory::ranker::{Candidate, Ranker};
use crate::memory::store::MetadataStore;
use crate::memory::types::MemoryType;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub question: String,
    /// Body budget in tokens. Zero or negative means unbounded.
    pub max_tokens: i64,
    pub top_k_sessions: usize,
    pub extra_files: Vec<PathBuf>,
    pub retrieve: RetrieveOptions,
}

impl BuildOptions {
    pub fn new(question: impl Into<String>) -> Self {
        Self::from_config(question, &VaultConfig::default())
    }

    pub fn from_config(question: impl Into<String>, config: &VaultConfig) -> Self {
        Self {
            question: question.into(),
            max_tokens: config.context.max_tokens,
            top_k_sessions: config.context.top_k_sessions,
            extra_files: Vec::new(),
            retrieve: RetrieveOptions::from(&config.retrieval),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildResult {
    pub system_prompt: String,
    pub context_text: String,
    /// Tokens spent on the body; the system prompt is not counted.
    pub tokens_used: usize,
    pub chunks_used: usize,
    pub memories_used: usize,
    pub sessions_used: usize,
    /// `decision:<id>`, `session:<id>`, `chunk:<id>`, `memory:<id>` or
    /// `file (explicit):<path>`, in body order.
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

/// Running body text with its token spend.
struct Composer<'a> {
    tokenizer: &'a dyn Tokenizer,
    limit: Option<usize>,
    used: usize,
    text: String,
    sources: Vec<String>,
}

impl<'a> Composer<'a> {
    fn new(tokenizer: &'a dyn Tokenizer, max_tokens: i64) -> Self {
        Self {
            tokenizer,
            limit: usize::try_from(max_tokens).ok().filter(|&n| n > 0),
            used: 0,
            text: String::new(),
            sources: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str, source: String) {
        self.used += self.tokenizer.count(fragment);
        self.text.push_str(fragment);
        self.sources.push(source);
    }

    /// Append only if the fragment fits in what is left of the budget.
    fn try_push(&mut self, fragment: &str, source: String) -> bool {
        let cost = self.tokenizer.count(fragment);
        if let Some(limit) = self.limit {
            if self.used + cost > limit {
                return false;
            }
        }
        self.used += cost;
        self.text.push_str(fragment);
        self.sources.push(source);
        true
    }
}

/// Prefix `fragment` with `heading` when it opens its section.
fn with_heading(opened: bool, heading: &str, fragment: String) -> String {
    if opened {
        fragment
    } else {
        format!("{heading}{fragment}")
    }
}

pub struct ContextBuilder {
    store: Arc<dyn MetadataStore>,
    retriever: Arc<dyn Retriever>,
    formatter: Arc<dyn Formatter>,
    tokenizer: Arc<dyn Tokenizer>,
    ranker: Ranker,
}

impl ContextBuilder {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        retriever: Arc<dyn Retriever>,
        formatter: Arc<dyn Formatter>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            store,
            retriever,
            formatter,
            tokenizer,
            ranker: Ranker::default(),
        }
    }

    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    pub async fn build(&self, options: &BuildOptions) -> Result<BuildResult> {
        let project = self.store.get_project()?;
        let conventions = self.store.list_memories(Some(MemoryType::Convention))?;
        let constraints = self.store.list_memories(Some(MemoryType::Constraint))?;
        let system_prompt = self
            .formatter
            .system_prompt(project.as_ref(), &conventions, &constraints);

        let mut body = Composer::new(self.tokenizer.as_ref(), options.max_tokens);
        let mut result = BuildResult {
            system_prompt,
            ..BuildResult::default()
        };

        // Decisions are never budgeted.
        let decisions = self.store.list_memories(Some(MemoryType::Decision))?;
        for (i, decision) in decisions.iter().enumerate() {
            let fragment = with_heading(i > 0, "## Decisions\n", self.formatter.memory(decision));
            body.push(&fragment, format!("decision:{}", decision.id));
        }

        if options.top_k_sessions > 0 {
            let sessions = self.store.last_sessions(options.top_k_sessions)?;
            for session in &sessions {
                let fragment = with_heading(
                    result.sessions_used > 0,
                    "\n## Recent sessions\n",
                    self.formatter.session(session),
                );
                if !body.try_push(&fragment, format!("session:{}", session.id)) {
                    tracing::debug!(used = body.used, "session history truncated by budget");
                    break;
                }
                result.sessions_used += 1;
            }
        }

        let retrieval = self.retriever.retrieve(&options.question, &options.retrieve).await?;
        if let Some(reason) = &retrieval.degraded {
            tracing::warn!(%reason, "building context without semantic retrieval");
        }
        result.degraded = retrieval.degraded;

        let memories = retrieval
            .value
            .memories
            .into_iter()
            .filter(|m| !m.item.memory_type.is_always_included())
            .collect();
        let candidates = self.ranker.merge(retrieval.value.chunks, memories);

        let (mut chunks_closed, mut memories_closed) = (false, false);
        let heading = "\n## Relevant context\n";
        for candidate in &candidates {
            let opened = result.chunks_used + result.memories_used > 0;
            match candidate {
                Candidate::Chunk(scored) if !chunks_closed => {
                    let chunk = &scored.item;
                    let path = self
                        .store
                        .get_file(&chunk.file_id)?
                        .map(|f| f.path)
                        .unwrap_or_else(|| chunk.file_id.clone());
                    let fragment = with_heading(opened, heading, self.formatter.chunk(chunk, &path));
                    if body.try_push(&fragment, format!("chunk:{}", chunk.id)) {
                        result.chunks_used += 1;
                    } else {
                        tracing::debug!(used = body.used, "remaining chunks dropped by budget");
                        chunks_closed = true;
                    }
                }
                Candidate::Memory(scored) if !memories_closed => {
                    let memory = &scored.item;
                    let fragment = with_heading(opened, heading, self.formatter.memory(memory));
                    if body.try_push(&fragment, format!("memory:{}", memory.id)) {
                        result.memories_used += 1;
                    } else {
                        tracing::debug!(used = body.used, "remaining memories dropped by budget");
                        memories_closed = true;
                    }
                }
                _ => {}
            }
        }

        for path in &options.extra_files {
            let contents = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let display = path.display().to_string();
            let fragment = format!("\n{}", self.formatter.file(&display, &contents));
            body.push(&fragment, format!("file (explicit):{display}"));
        }

        result.tokens_used = body.used;
        result.context_text = body.text;
        result.sources = body.sources;
        Ok(result)
    }
}
