pub mod builtin;
pub mod registry;

pub use registry::ToolRegistry;

/// Cut `s` to at most `max_chars` characters, on a char boundary.
///
/// Payloads handed to the model or to tools are bounded with this before
/// they cross the call boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_short_input_unchanged() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("h\u{e9}llo", 2), "h\u{e9}");
        assert_eq!(truncate_chars("\u{20ac}35M", 1), "\u{20ac}");
    }
}
