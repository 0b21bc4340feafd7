/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a reply into chunks of at most `max_len` bytes, preferring paragraph
/// and line breaks.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            parts.push(remaining.to_string());
            break;
        }

        let first_char = remaining.chars().next().map_or(1, char::len_utf8);
        let hard = floor_boundary(remaining, max_len).max(first_char);
        let chunk = &remaining[..hard];
        let split_at = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .filter(|&i| i > 0)
            .unwrap_or(hard);

        let (part, rest) = remaining.split_at(split_at);
        parts.push(part.to_string());
        remaining = rest.trim_start_matches('\n');
    }

    parts
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..floor_boundary(s, max)])
    }
}
