//! Conservative http(s) URL detection used by the hybrid search
//! engine's short-circuit path.

use regex::Regex;
use std::sync::OnceLock;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s<>\x22]+").expect("static URL regex is valid"))
}

/// Returns the first well-formed http(s) URL found in `text`, trimming
/// common trailing punctuation that is not part of the URL itself.
pub fn detect_first_url(text: &str) -> Option<String> {
    let m = url_regex().find(text)?;
    let raw = m.as_str();
    let trimmed = raw.trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | ']' | '"' | '\''));
    Some(trimmed.to_string())
}
