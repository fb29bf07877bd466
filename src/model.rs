use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// First eight hex digits, enough to address an entity from the CLI.
            pub fn short(&self) -> String {
                self.0.simple().to_string()[..8].to_string()
            }

            pub fn matches_prefix(&self, prefix: &str) -> bool {
                let prefix = prefix.trim().to_ascii_lowercase().replace('-', "");
                !prefix.is_empty() && self.0.simple().to_string().starts_with(&prefix)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(NoteId);
entity_id!(FolderId);

/// Shown in place of a blank title.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub folder_id: Option<FolderId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_favorited: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Note {
    pub(crate) fn from_draft(draft: NoteDraft, now: OffsetDateTime) -> Self {
        Self {
            id: NoteId::generate(),
            title: draft.title,
            content: draft.content,
            folder_id: draft.folder_id,
            created_at: now,
            updated_at: now,
            is_pinned: draft.is_pinned,
            is_favorited: draft.is_favorited,
            tags: draft.tags,
        }
    }

    /// Stamps a mutation. The clock is never allowed to move `updated_at`
    /// backwards or below `created_at`.
    pub(crate) fn touch(&mut self, now: OffsetDateTime) {
        let floor = self.updated_at.max(self.created_at);
        self.updated_at = now.max(floor);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing.eq_ignore_ascii_case(tag))
    }

    pub fn display_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            UNTITLED
        } else {
            trimmed
        }
    }
}

/// Creation payload for a note; id and timestamps are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub folder_id: Option<FolderId>,
    pub is_pinned: bool,
    pub is_favorited: bool,
    pub tags: Vec<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, folder_id: Option<FolderId>) -> Self {
        self.folder_id = folder_id;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.is_pinned = pinned;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update merged onto an existing note. `None` leaves a field alone;
/// `folder_id: Some(None)` moves the note out of any folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub folder_id: Option<Option<FolderId>>,
    pub is_pinned: Option<bool>,
    pub is_favorited: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl NoteUpdate {
    pub fn body(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn apply(self, note: &mut Note) {
        if let Some(title) = self.title {
            note.title = title;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(folder_id) = self.folder_id {
            note.folder_id = folder_id;
        }
        if let Some(pinned) = self.is_pinned {
            note.is_pinned = pinned;
        }
        if let Some(favorited) = self.is_favorited {
            note.is_favorited = favorited;
        }
        if let Some(tags) = self.tags {
            note.tags = tags;
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub order: i64,
    #[serde(default = "default_expanded")]
    pub is_expanded: bool,
    pub icon: Option<String>,
    pub color: Option<String>,
}

fn default_expanded() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderDraft {
    pub name: String,
    pub parent_id: Option<FolderId>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl FolderDraft {
    pub fn new(name: impl Into<String>, parent_id: Option<FolderId>) -> Self {
        Self {
            name: name.into(),
            parent_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<FolderId>>,
    pub icon: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

/// What the note list is scoped to: one of the smart views or a real folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum FolderSelector {
    AllNotes,
    Recent,
    Pinned,
    Favorites,
    Tagged,
    Archive,
    Trash,
    Specific(FolderId),
}

impl FolderSelector {
    pub fn folder_id(&self) -> Option<FolderId> {
        match self {
            FolderSelector::Specific(id) => Some(*id),
            _ => None,
        }
    }

    /// Folder a note created while this selector is active should land in.
    pub fn target_folder(&self) -> Option<FolderId> {
        self.folder_id()
    }
}

impl fmt::Display for FolderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderSelector::AllNotes => f.write_str("all"),
            FolderSelector::Recent => f.write_str("recent"),
            FolderSelector::Pinned => f.write_str("pinned"),
            FolderSelector::Favorites => f.write_str("favorites"),
            FolderSelector::Tagged => f.write_str("tagged"),
            FolderSelector::Archive => f.write_str("archive"),
            FolderSelector::Trash => f.write_str("trash"),
            FolderSelector::Specific(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is neither a smart view nor a folder id")]
pub struct ParseSelectorError(pub String);

impl FromStr for FolderSelector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let selector = match raw.to_ascii_lowercase().as_str() {
            "all" | "all-notes" => FolderSelector::AllNotes,
            "recent" => FolderSelector::Recent,
            "pinned" => FolderSelector::Pinned,
            "favorites" | "favourites" | "starred" => FolderSelector::Favorites,
            "tagged" => FolderSelector::Tagged,
            "archive" => FolderSelector::Archive,
            "trash" => FolderSelector::Trash,
            _ => FolderId::from_str(raw)
                .map(FolderSelector::Specific)
                .map_err(|_| ParseSelectorError(raw.to_string()))?,
        };
        Ok(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn selector_parses_reserved_names_and_ids() {
        assert_eq!("starred".parse::<FolderSelector>(), Ok(FolderSelector::Favorites));
        assert_eq!(" Pinned ".parse::<FolderSelector>(), Ok(FolderSelector::Pinned));
        let id = FolderId::generate();
        assert_eq!(
            id.to_string().parse::<FolderSelector>(),
            Ok(FolderSelector::Specific(id))
        );
        assert!("groceries".parse::<FolderSelector>().is_err());
    }

    #[test]
    fn selector_display_round_trips_through_parse() {
        for selector in [
            FolderSelector::AllNotes,
            FolderSelector::Recent,
            FolderSelector::Trash,
            FolderSelector::Specific(FolderId::generate()),
        ] {
            assert_eq!(selector.to_string().parse::<FolderSelector>(), Ok(selector));
        }
    }

    #[test]
    fn touch_never_moves_backwards() {
        let now = OffsetDateTime::now_utc();
        let mut note = Note::from_draft(NoteDraft::new("a", "b"), now);
        note.touch(now - Duration::hours(1));
        assert_eq!(note.updated_at, now);
        note.touch(now + Duration::seconds(5));
        assert_eq!(note.updated_at, now + Duration::seconds(5));
        assert!(note.updated_at >= note.created_at);
    }

    #[test]
    fn id_prefix_matching_ignores_case_and_dashes() {
        let id = NoteId::generate();
        let short = id.short();
        assert!(id.matches_prefix(&short.to_uppercase()));
        assert!(id.matches_prefix(&id.to_string()));
        assert!(!id.matches_prefix(""));
    }
}
