//! Helpers over note content, which is stored as light HTML markup.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

const TITLE_MAX_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|blockquote|pre)>")
        .expect("block break pattern compiles")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

/// Markup reduced to readable text: block-level closes become line breaks,
/// remaining tags are dropped and the common entities decoded.
pub fn plain_text(markup: &str) -> String {
    let broken = BLOCK_BREAK.replace_all(markup, "\n");
    let stripped = TAG.replace_all(&broken, "");
    let decoded = decode_entities(&stripped);
    let lines: Vec<&str> = decoded.lines().map(str::trim).collect();
    lines.join("\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn word_count(markup: &str) -> usize {
    plain_text(markup).unicode_words().count()
}

/// User-perceived characters, line breaks excluded.
pub fn char_count(markup: &str) -> usize {
    plain_text(markup)
        .graphemes(true)
        .filter(|g| *g != "\n")
        .count()
}

pub fn is_blank(markup: &str) -> bool {
    plain_text(markup).trim().is_empty()
}

/// First non-empty line of the content, cut to fifty characters.
pub fn detect_title(markup: &str) -> Option<String> {
    let text = plain_text(markup);
    let first = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    Some(truncate(first, TITLE_MAX_CHARS))
}

/// Single-line summary for list views.
pub fn preview(markup: &str, max_chars: usize) -> String {
    let text = plain_text(markup);
    let joined = text
        .lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&joined, max_chars)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max_chars).collect();
    if graphemes.next().is_some() {
        format!("{head}{ELLIPSIS}")
    } else {
        head
    }
}
