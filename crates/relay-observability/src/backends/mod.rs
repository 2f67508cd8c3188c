//! Built-in backends.

pub mod console;
pub mod file;
pub mod posthog;

pub use console::ConsoleBackend;
pub use file::FileBackend;
pub use posthog::PostHogBackend;

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("", 3), "");
    }
}
