//! Shared helpers used by the agent and metric layers.

pub mod deadline;

pub use deadline::{run_with_deadline, Deadlined};

use std::sync::{Mutex, MutexGuard};

/// Maximum characters of raw CLI output embedded in error messages.
pub const PREVIEW_CHARS: usize = 200;

/// Returns at most [`PREVIEW_CHARS`] characters of `text`, marking truncation with `...`.
pub fn preview(text: &str) -> String {
    truncate_chars(text, PREVIEW_CHARS)
}

/// Lossy UTF-8 preview of raw process output.
pub fn preview_bytes(bytes: &[u8]) -> String {
    preview(&String::from_utf8_lossy(bytes))
}

/// Truncates on a character boundary and appends `...` when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Locks `mutex`, taking the data even if a previous holder panicked.
///
/// Guarded state here is plain bookkeeping that stays valid across a panic.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_untouched() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn test_preview_truncates_at_limit() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.len(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));

        let exact = "y".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 3), "ééé...");
    }
}
