//! Rendering of entities into context fragments.

use crate::memory::types::{Chunk, Memory, Project, Session};

/// Turns stored entities into the text inserted into a built context.
pub trait Formatter: Send + Sync {
    fn memory(&self, memory: &Memory) -> String;

    /// `path` is the owning file's path, or the file id when it cannot be resolved.
    fn chunk(&self, chunk: &Chunk, path: &str) -> String;

    fn session(&self, session: &Session) -> String;

    fn file(&self, path: &str, contents: &str) -> String;

    /// The always-included preamble: project profile plus standing rules.
    fn system_prompt(&self, project: Option<&Project>, conventions: &[Memory], constraints: &[Memory]) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn memory(&self, memory: &Memory) -> String {
        format!("- [{}] {}\n", memory.memory_type, memory.content)
    }

    fn chunk(&self, chunk: &Chunk, path: &str) -> String {
        let mut out = format!("### {path} (lines {}-{})\n```\n", chunk.start_line, chunk.end_line);
        out.push_str(&chunk.content);
        if !chunk.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
        out
    }

    fn session(&self, session: &Session) -> String {
        format!(
            "Q: {}\nA: {}\n(model: {}, {})\n\n",
            session.question, session.response_summary, session.model_used, session.created_at
        )
    }

    fn file(&self, path: &str, contents: &str) -> String {
        let mut out = format!("### {path}\n```\n{contents}");
        if !contents.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
        out
    }

    fn system_prompt(&self, project: Option<&Project>, conventions: &[Memory], constraints: &[Memory]) -> String {
        let name = project.map(|p| p.name.as_str()).unwrap_or("unknown");
        let mut out = format!(
            "You are a coding assistant working on the project \"{name}\". \
             Use the project context below when answering.\n"
        );

        if let Some(stack) = project.map(|p| &p.tech_stack) {
            for (label, value) in [
                ("Language", &stack.language),
                ("Framework", &stack.framework),
                ("Database", &stack.database),
            ] {
                if !value.is_empty() {
                    out.push_str(&format!("{label}: {value}\n"));
                }
            }
        }

        for (heading, items) in [("Conventions", conventions), ("Constraints", constraints)] {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {heading}\n"));
            for m in items {
                out.push_str(&format!("- {}\n", m.content));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryType, TechStack};

    #[test]
    fn system_prompt_without_project_says_unknown() {
        let prompt = MarkdownFormatter.system_prompt(None, &[], &[]);
        assert!(prompt.contains("\"unknown\""));
    }

    #[test]
    fn system_prompt_lists_stack_and_rules() {
        let project = Project {
            name: "shop".into(),
            root_path: "/srv/shop".into(),
            tech_stack: TechStack {
                language: "Go".into(),
                framework: String::new(),
                database: "PostgreSQL".into(),
            },
        };
        let conv = Memory::new("use camelCase", MemoryType::Convention, "user");
        let cons = Memory::new("never log secrets", MemoryType::Constraint, "user");
        let prompt = MarkdownFormatter.system_prompt(Some(&project), &[conv], &[cons]);

        assert!(prompt.contains("Language: Go"));
        assert!(prompt.contains("Database: PostgreSQL"));
        assert!(!prompt.contains("Framework:"));
        assert!(prompt.contains("## Conventions\n- use camelCase"));
        assert!(prompt.contains("## Constraints\n- never log secrets"));
    }

    #[test]
    fn chunk_is_fenced_with_location() {
        let chunk = Chunk::new("f1", "fn main() {}", 3, 5, "code");
        let text = MarkdownFormatter.chunk(&chunk, "src/main.rs");
        assert_eq!(text, "### src/main.rs (lines 3-5)\n```\nfn main() {}\n```\n\n");
    }
}
