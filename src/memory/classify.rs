//! Keyword-based memory type inference for untyped `remember` calls.

use super::types::MemoryType;

/// Markers checked in order against the lowercased content; first hit wins.
const RULES: &[(MemoryType, &[&str])] = &[
    (MemoryType::Todo, &["todo", "fixme", "need to", "should add"]),
    (
        MemoryType::Constraint,
        &["never", "must not", "must", "always", "do not", "don't"],
    ),
    (
        MemoryType::Convention,
        &["convention", "naming", "style", "prefer", "use camelcase", "use snake_case"],
    ),
    (
        MemoryType::Decision,
        &["decided", "chose", "switched to", "we use", "going with", "migrated to"],
    ),
];

/// Guess a memory type from its content. Falls back to [`MemoryType::Note`].
pub fn classify(content: &str) -> MemoryType {
    let lowered = content.to_lowercase();
    RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| contains_word(&lowered, m)))
        .map(|(kind, _)| *kind)
        .unwrap_or(MemoryType::Note)
}

/// `marker` occurs in `text` with no alphanumeric character on either side.
fn contains_word(text: &str, marker: &str) -> bool {
    text.match_indices(marker).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + marker.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
