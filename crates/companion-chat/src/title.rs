/// Suffix appended to a title cut at the character budget.
const ELLIPSIS: &str = "...";

/// Build a conversation title from the first user message.
///
/// The text is trimmed; if it is longer than `max_chars` characters, the
/// first `max_chars` are kept and `...` appended. Counting is by `char`, so
/// multi-byte text is never split mid-character.
pub fn derive_title(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > max_chars {
        let mut title: String = trimmed.chars().take(max_chars).collect();
        title.push_str(ELLIPSIS);
        title
    } else {
        trimmed.to_string()
    }
}
