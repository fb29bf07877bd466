use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::journaling::{CommitError, CommitSink};
use crate::model::{FolderId, Note, NoteDraft, NoteId, NoteUpdate};
use crate::store::LookupError;

const MAX_TAG_LEN: usize = 64;

/// Owns the note collection and the notion of a "current" note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStore {
    notes: Vec<Note>,
    selected_note_id: Option<NoteId>,
    #[serde(skip)]
    search_query: String,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_notes(notes: Vec<Note>) -> Self {
        Self {
            notes,
            ..Self::default()
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn selected_note_id(&self) -> Option<NoteId> {
        self.selected_note_id
    }

    /// The selected note, if the selection still points at something.
    pub fn selected_note(&self) -> Option<&Note> {
        self.selected_note_id.and_then(|id| self.get(id))
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn add_note(&mut self, draft: NoteDraft) -> NoteId {
        let mut note = Note::from_draft(draft, OffsetDateTime::now_utc());
        note.tags = normalize_tags(note.tags);
        let id = note.id;
        tracing::debug!(%id, folder = ?note.folder_id, "adding note");
        self.notes.push(note);
        self.selected_note_id = Some(id);
        id
    }

    /// Shallow-merges `update` onto the note and refreshes `updated_at`.
    /// Returns `false` when no note has this id.
    pub fn update_note(&mut self, id: NoteId, update: NoteUpdate) -> bool {
        let Some(note) = self.notes.iter_mut().find(|note| note.id == id) else {
            tracing::debug!(%id, "update for unknown note ignored");
            return false;
        };
        update.apply(note);
        note.touch(OffsetDateTime::now_utc());
        true
    }

    pub fn delete_note(&mut self, id: NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        let removed = self.notes.len() != before;
        if removed {
            tracing::debug!(%id, "deleted note");
            if self.selected_note_id == Some(id) {
                self.select_first();
            }
        }
        removed
    }

    /// Removes every note filed under one of `folder_ids`. Folder deletion
    /// does not call this on its own.
    pub fn delete_notes_by_folder(&mut self, folder_ids: &[FolderId]) -> Vec<NoteId> {
        let mut removed = Vec::new();
        self.notes.retain(|note| {
            let doomed = note
                .folder_id
                .map(|folder| folder_ids.contains(&folder))
                .unwrap_or(false);
            if doomed {
                removed.push(note.id);
            }
            !doomed
        });
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "cascaded note deletion");
            if self
                .selected_note_id
                .is_some_and(|selected| removed.contains(&selected))
            {
                self.select_first();
            }
        }
        removed
    }

    pub fn select_note(&mut self, id: Option<NoteId>) {
        self.selected_note_id = id;
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn toggle_pin_note(&mut self, id: NoteId) -> Option<bool> {
        self.mutate(id, |note| {
            note.is_pinned = !note.is_pinned;
            note.is_pinned
        })
    }

    pub fn toggle_favorite_note(&mut self, id: NoteId) -> Option<bool> {
        self.mutate(id, |note| {
            note.is_favorited = !note.is_favorited;
            note.is_favorited
        })
    }

    pub fn move_note(&mut self, id: NoteId, folder_id: Option<FolderId>) -> bool {
        self.update_note(
            id,
            NoteUpdate {
                folder_id: Some(folder_id),
                ..NoteUpdate::default()
            },
        )
    }

    /// Attaches a tag; returns `Some(false)` when the note already carries it.
    pub fn add_tag(&mut self, id: NoteId, tag: &str) -> Option<bool> {
        let tag = clean_tag(tag)?;
        let note = self.notes.iter().find(|note| note.id == id)?;
        if note.has_tag(&tag) {
            return Some(false);
        }
        self.mutate(id, |note| {
            note.tags.push(tag);
            true
        })
    }

    pub fn remove_tag(&mut self, id: NoteId, tag: &str) -> Option<bool> {
        let tag = tag.trim();
        let note = self.notes.iter().find(|note| note.id == id)?;
        if !note.has_tag(tag) {
            return Some(false);
        }
        self.mutate(id, |note| {
            note.tags.retain(|existing| !existing.eq_ignore_ascii_case(tag));
            true
        })
    }

    /// Resolves a full id or an unambiguous id prefix.
    pub fn resolve(&self, needle: &str) -> Result<NoteId, LookupError> {
        let candidates: Vec<NoteId> = self
            .notes
            .iter()
            .map(|note| note.id)
            .filter(|id| id.matches_prefix(needle))
            .collect();
        match candidates.as_slice() {
            [id] => Ok(*id),
            [] => Err(LookupError::NoteNotFound(needle.to_string())),
            _ => Err(LookupError::Ambiguous {
                needle: needle.to_string(),
                matches: candidates.len(),
            }),
        }
    }

    fn mutate<T>(&mut self, id: NoteId, f: impl FnOnce(&mut Note) -> T) -> Option<T> {
        let note = self.notes.iter_mut().find(|note| note.id == id)?;
        let out = f(note);
        note.touch(OffsetDateTime::now_utc());
        Some(out)
    }

    fn select_first(&mut self) {
        self.selected_note_id = self.notes.first().map(|note| note.id);
    }
}

impl CommitSink for NoteStore {
    fn commit_edit(&mut self, id: NoteId, title: &str, content: &str) -> Result<(), CommitError> {
        if self.update_note(id, NoteUpdate::body(title, content)) {
            Ok(())
        } else {
            Err(CommitError::MissingNote(id))
        }
    }
}

fn clean_tag(raw: &str) -> Option<String> {
    let mut tag = raw.trim().trim_start_matches('#').to_string();
    if tag.is_empty() {
        return None;
    }
    if tag.len() > MAX_TAG_LEN {
        let mut cut = MAX_TAG_LEN;
        while !tag.is_char_boundary(cut) {
            cut -= 1;
        }
        tag.truncate(cut);
    }
    Some(tag)
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().filter_map(|tag| clean_tag(tag)) {
        if !out.iter().any(|existing| existing.eq_ignore_ascii_case(&tag)) {
            out.push(tag);
        }
    }
    out
}
