/// Truncate a string to at most `max_bytes` bytes without splitting a character.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

/// Strip a markdown code fence (with or without a language tag) around a
/// model response. Models in JSON mode still occasionally wrap their output.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match body.find('\n') {
        Some(newline) if body[..newline].chars().all(|c| c.is_ascii_alphanumeric()) => {
            &body[newline + 1..]
        }
        _ => body,
    };
    body.trim_end().trim_end_matches("```").trim()
}
