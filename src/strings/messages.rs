//! # Messages
//!
//! Constant strings and format functions for user-facing messages.

pub const SCRIPT_TIMEOUT: &str = "Hmm, something timed out. Please try again.";
pub const EMPTY_COMMAND: &str = "no command to execute";
pub const TRUNCATION_MARKER: &str = "...";
pub const INTERACTIONS_UNSUPPORTED: &str =
    "interactive components are not supported by this remote";

pub fn substitution_failed(rule: &str, err: &str) -> String {
    format!("Could not format output for rule '{rule}': {err}")
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate_output(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_long_output() {
        let text = "a".repeat(4500);
        let out = truncate_output(&text, 4000);
        assert_eq!(out.chars().count(), 4000);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..3997], &text[..3997]);
    }

    #[test]
    fn test_truncate_short_output_untouched() {
        assert_eq!(truncate_output("hello", 4000), "hello");
        let exact = "b".repeat(4000);
        assert_eq!(truncate_output(&exact, 4000), exact);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let out = truncate_output(&text, 6);
        assert_eq!(out, "ééé...");
    }
}
