//! Context assembly: budgeted composition of project facts, history and
//! retrieved material into a prompt for an assistant.

pub mod builder;
pub mod formatter;
pub mod tokenizer;

pub use builder::{BuildOptions, BuildResult, ContextBuilder};
pub use formatter::{Formatter, MarkdownFormatter};
pub use tokenizer::{create_tokenizer, HeuristicTokenizer, HfTokenizer, Tokenizer};
