use super::schema::{FileRecord, SearchOutcome};

/// Case-insensitive substring search over names and textual content.
///
/// The query is trimmed first; a blank query returns [`SearchOutcome::Prompt`]
/// without looking at the corpus.
pub fn search(query: &str, corpus: &[FileRecord]) -> SearchOutcome {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchOutcome::Prompt;
    }

    let matches = corpus
        .iter()
        .filter(|record| {
            record.name.to_lowercase().contains(&needle)
                || record
                    .searchable_content()
                    .is_some_and(|content| content.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect();
    SearchOutcome::from_matches(matches)
}
