use std::ops::Range;

use regex::{Regex, RegexBuilder};

/// Case-insensitive literal matcher for the active search text.
pub fn build_highlight_regex(query: &str) -> Option<Regex> {
    if query.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .ok()
}

pub fn match_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    build_highlight_regex(query)
        .map(|regex| regex.find_iter(text).map(|m| m.range()).collect())
        .unwrap_or_default()
}

/// Wraps every hit in `open`/`close` markers, keeping the original casing.
pub fn mark_matches(text: &str, query: &str, open: &str, close: &str) -> String {
    let ranges = match_ranges(text, query);
    if ranges.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + ranges.len() * (open.len() + close.len()));
    let mut cursor = 0;
    for range in ranges {
        out.push_str(&text[cursor..range.start]);
        out.push_str(open);
        out.push_str(&text[range.clone()]);
        out.push_str(close);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}
