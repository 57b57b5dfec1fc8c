use crate::aggregate::OrderedSummaries;

/// Separator placed between source blocks of a merged artifact.
pub const MERGE_DELIMITER: &str = "\n\n---\n\n";
/// Number of characters kept by [`preview`].
pub const PREVIEW_CHARS: usize = 200;

/// Concatenates summaries in recording order, each under its source pod's name.
///
/// `name_of` resolves a pod id to a display name; the id is used when it returns `None`.
pub fn merge_summaries(
    summaries: &OrderedSummaries,
    name_of: impl Fn(&str) -> Option<String>,
) -> String {
    summaries
        .iter()
        .map(|s| {
            let name = name_of(&s.source_pod_id).unwrap_or_else(|| s.source_pod_id.clone());
            format!("## Source: {}\n{}", name, s.content)
        })
        .collect::<Vec<_>>()
        .join(MERGE_DELIMITER)
}

/// Delivery content for a set of summaries: the lone summary as-is, or the
/// merged text for two or more. Returns `(content, is_summarized)`.
pub fn combine(
    summaries: &OrderedSummaries,
    name_of: impl Fn(&str) -> Option<String>,
) -> Option<(String, bool)> {
    match summaries.len() {
        0 => None,
        1 => summaries.iter().next().map(|s| (s.content.clone(), s.is_summarized)),
        _ => Some((merge_summaries(summaries, name_of), summaries.all_summarized())),
    }
}

/// First [`PREVIEW_CHARS`] characters of `text`.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
