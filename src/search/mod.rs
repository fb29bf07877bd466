use std::cmp::Ordering;

use crate::model::Note;

/// Which field satisfied a query. Ordered by ranking strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Title,
    Content,
    Tag,
}

impl MatchKind {
    pub fn label(self) -> &'static str {
        match self {
            MatchKind::Title => "title",
            MatchKind::Content => "content",
            MatchKind::Tag => "tag",
        }
    }
}

/// A free-text query: case-insensitive substring containment against the
/// title, the content and each tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
    needle: String,
}

impl SearchQuery {
    pub fn new(input: &str) -> Self {
        let raw = input.to_string();
        let needle = raw.to_lowercase();
        Self { raw, needle }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    /// Strongest field the query hits, or `None` for no match. An inactive
    /// query matches nothing here; callers skip filtering instead.
    pub fn match_kind(&self, note: &Note) -> Option<MatchKind> {
        if !self.is_active() {
            return None;
        }
        if contains_folded(&note.title, &self.needle) {
            return Some(MatchKind::Title);
        }
        if contains_folded(&note.content, &self.needle) {
            return Some(MatchKind::Content);
        }
        if note
            .tags
            .iter()
            .any(|tag| contains_folded(tag, &self.needle))
        {
            return Some(MatchKind::Tag);
        }
        None
    }

    pub fn matches(&self, note: &Note) -> bool {
        !self.is_active() || self.match_kind(note).is_some()
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Keeps matching notes and orders them: title hits first, then content or
/// tag hits, each tier newest first.
pub fn rank<'a>(query: &SearchQuery, notes: impl IntoIterator<Item = &'a Note>) -> Vec<&'a Note> {
    let mut hits: Vec<(bool, &Note)> = notes
        .into_iter()
        .filter_map(|note| {
            query
                .match_kind(note)
                .map(|kind| (kind == MatchKind::Title, note))
        })
        .collect();
    hits.sort_by(|(a_title, a), (b_title, b)| match b_title.cmp(a_title) {
        Ordering::Equal => b.updated_at.cmp(&a.updated_at),
        other => other,
    });
    hits.into_iter().map(|(_, note)| note).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteDraft;
    use time::{Duration, OffsetDateTime};

    fn note(title: &str, content: &str, age_minutes: i64) -> Note {
        let now = OffsetDateTime::now_utc();
        Note::from_draft(
            NoteDraft::new(title, content),
            now - Duration::minutes(age_minutes),
        )
    }

    #[test]
    fn matches_title_content_and_tags_case_insensitively() {
        let query = SearchQuery::new("GROCERIES");
        let by_title = note("Groceries", "milk", 0);
        let by_content = note("Work", "groceries list", 0);
        let mut by_tag = note("Errands", "", 0);
        by_tag.tags.push("Groceries-weekly".into());
        let miss = note("Other", "nothing", 0);

        assert_eq!(query.match_kind(&by_title), Some(MatchKind::Title));
        assert_eq!(query.match_kind(&by_content), Some(MatchKind::Content));
        assert_eq!(query.match_kind(&by_tag), Some(MatchKind::Tag));
        assert_eq!(query.match_kind(&miss), None);
    }

    #[test]
    fn empty_query_is_inactive_and_matches_everything() {
        let query = SearchQuery::new("");
        assert!(!query.is_active());
        assert!(query.matches(&note("x", "y", 0)));
    }

    #[test]
    fn surrounding_whitespace_is_part_of_the_needle() {
        let query = SearchQuery::new(" milk");
        assert!(query.is_active());
        assert_eq!(query.match_kind(&note("Shopping", "milk", 0)), None);
        assert_eq!(
            query.match_kind(&note("Shopping", "oat milk", 0)),
            Some(MatchKind::Content)
        );
    }

    #[test]
    fn whitespace_only_query_still_filters() {
        let query = SearchQuery::new("  ");
        assert!(query.is_active());
        assert!(!query.matches(&note("one", "single spaced", 0)));
        assert!(query.matches(&note("two", "double  spaced", 0)));
    }

    #[test]
    fn ranking_puts_title_hits_first_even_when_older() {
        let title_hit = note("Groceries", "milk", 120);
        let content_hit = note("Work", "groceries list", 1);
        let query = SearchQuery::new("groceries");
        let ranked = rank(&query, [&content_hit, &title_hit]);
        let titles: Vec<&str> = ranked.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Groceries", "Work"]);
    }

    #[test]
    fn ranking_ties_break_by_recency() {
        let older = note("plan a", "", 30);
        let newer = note("plan b", "", 5);
        let query = SearchQuery::new("plan");
        let ranked = rank(&query, [&older, &newer]);
        assert_eq!(ranked[0].title, "plan b");
    }
}
