use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::model::{FolderDraft, FolderId, Note, NoteDraft, NoteId};

pub mod folders;
pub mod notes;
pub mod ui;

pub use folders::{DropPosition, FolderSortBy, FolderStore, GroupBy, ReorderRequest};
pub use notes::NoteStore;
pub use ui::{NoteSortBy, UiPreferences, ViewMode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no note matches '{0}'")]
    NoteNotFound(String),
    #[error("no folder matches '{0}'")]
    FolderNotFound(String),
    #[error("'{needle}' is ambiguous ({matches} matches); use more of the id")]
    Ambiguous { needle: String, matches: usize },
}

/// What a cascading folder delete removed from both stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub folders: Vec<FolderId>,
    pub notes: Vec<NoteId>,
}

/// The three stores the presentation layer reads and mutates. Built once at
/// start-up and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub notes: NoteStore,
    pub folders: FolderStore,
    pub ui: UiPreferences,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes the folder subtree and then every note filed under it.
    pub fn delete_folder_cascade(&mut self, id: FolderId) -> CascadeOutcome {
        let folders = self.folders.delete_folder(id);
        let notes = if folders.is_empty() {
            Vec::new()
        } else {
            self.notes.delete_notes_by_folder(&folders)
        };
        tracing::info!(
            %id,
            folders = folders.len(),
            notes = notes.len(),
            "deleted folder with cascade"
        );
        CascadeOutcome { folders, notes }
    }

    /// Notes whose folder reference no longer resolves.
    pub fn orphaned_notes(&self) -> Vec<&Note> {
        self.notes
            .notes()
            .iter()
            .filter(|note| {
                note.folder_id
                    .map(|folder| !self.folders.contains(folder))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// First-run content: two root folders and a few notes spread over them.
    pub fn seeded() -> Self {
        let mut workspace = Self::new();
        let work = workspace
            .folders
            .add_folder(FolderDraft::new("Work", None));
        let personal = workspace
            .folders
            .add_folder(FolderDraft::new("Personal", None));

        let now = OffsetDateTime::now_utc();
        let seeds = [
            (
                NoteDraft::new("Shopping list", "Milk\nBread\nEggs\nFruit\nVegetables")
                    .in_folder(Some(personal))
                    .pinned(true)
                    .with_tags(["shopping", "life"]),
                Duration::days(1),
            ),
            (
                NoteDraft::new(
                    "Plan the week",
                    "1. Finish the project proposal\n2. Prepare meeting notes\n3. Update the weekly report\n4. Code review",
                )
                .in_folder(Some(work))
                .with_tags(["work", "planning"]),
                Duration::days(2),
            ),
            (
                NoteDraft::new(
                    "Meeting notes",
                    "## Product sync\n\n- New feature discussion\n- User feedback triage\n- Next week's assignments",
                )
                .in_folder(Some(work))
                .with_tags(["meeting", "work"]),
                Duration::days(3),
            ),
        ];
        let mut notes = Vec::with_capacity(seeds.len());
        for (draft, age) in seeds {
            notes.push(Note::from_draft(draft, now - age));
        }
        workspace.notes = NoteStore::from_notes(notes);
        tracing::info!("seeded first-run workspace");
        workspace
    }
}
