//! Read-only projections over a [`Workspace`]. Everything here is recomputed
//! on demand; nothing is cached between calls.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use time::{Duration, OffsetDateTime};

use crate::model::{Folder, FolderId, FolderSelector, Note};
use crate::search::{self, SearchQuery};
use crate::store::{FolderSortBy, GroupBy, NoteSortBy, Workspace};

/// How far back the "recent" smart view reaches.
pub const RECENT_WINDOW: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuickAccessCounts {
    pub all: usize,
    pub recent: usize,
    pub pinned: usize,
    pub favorites: usize,
    pub tagged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRow<'a> {
    pub folder: &'a Folder,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
    pub note_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteGroup<'a> {
    pub label: String,
    pub notes: Vec<&'a Note>,
}

/// Notes per folder, counting everything filed in the folder or any folder
/// below it. Notes pointing at missing folders are not counted anywhere.
pub fn folder_note_counts(workspace: &Workspace) -> HashMap<FolderId, usize> {
    let folders = &workspace.folders;
    let parents: HashMap<FolderId, Option<FolderId>> = folders
        .folders()
        .iter()
        .map(|folder| (folder.id, folder.parent_id))
        .collect();
    let mut counts: HashMap<FolderId, usize> =
        parents.keys().map(|id| (*id, 0usize)).collect();

    for note in workspace.notes.notes() {
        let mut cursor = note.folder_id.filter(|id| parents.contains_key(id));
        let mut hops = 0;
        while let Some(id) = cursor {
            if let Some(count) = counts.get_mut(&id) {
                *count += 1;
            }
            hops += 1;
            if hops > parents.len() {
                tracing::warn!(%id, "folder parent chain loops; stopping count walk");
                break;
            }
            cursor = parents.get(&id).copied().flatten();
        }
    }
    counts
}

pub fn quick_access_counts(workspace: &Workspace, now: OffsetDateTime) -> QuickAccessCounts {
    let notes = workspace.notes.notes();
    let count = |selector: FolderSelector| {
        notes
            .iter()
            .filter(|note| selector_matches(Some(selector), note, now))
            .count()
    };
    QuickAccessCounts {
        all: notes.len(),
        recent: count(FolderSelector::Recent),
        pinned: count(FolderSelector::Pinned),
        favorites: count(FolderSelector::Favorites),
        tagged: count(FolderSelector::Tagged),
    }
}

/// Whether `note` belongs in the list for `selector`. `None` means the whole
/// collection.
pub fn selector_matches(selector: Option<FolderSelector>, note: &Note, now: OffsetDateTime) -> bool {
    match selector {
        None | Some(FolderSelector::AllNotes) => true,
        Some(FolderSelector::Recent) => note.updated_at > now - RECENT_WINDOW,
        Some(FolderSelector::Pinned) => note.is_pinned,
        Some(FolderSelector::Favorites) => note.is_favorited,
        Some(FolderSelector::Tagged) => !note.tags.is_empty(),
        Some(FolderSelector::Archive) | Some(FolderSelector::Trash) => false,
        Some(FolderSelector::Specific(id)) => note.folder_id == Some(id),
    }
}

/// The note list as the presentation layer shows it. The folder or smart-view
/// filter runs first, the pinned-only toggle next, and the search text last,
/// so a search never escapes the selected scope.
pub fn visible_notes(workspace: &Workspace, now: OffsetDateTime) -> Vec<&Note> {
    let selection = workspace.folders.effective_selection();
    let mut scoped: Vec<&Note> = workspace
        .notes
        .notes()
        .iter()
        .filter(|note| selector_matches(selection, note, now))
        .filter(|note| !workspace.ui.show_pinned_only || note.is_pinned)
        .collect();

    let query = SearchQuery::new(workspace.notes.search_query());
    if query.is_active() {
        return search::rank(&query, scoped);
    }
    sort_notes(&mut scoped, workspace.ui.sort_by);
    scoped
}

/// Pinned notes lead under either sort key.
pub fn sort_notes(notes: &mut [&Note], sort_by: NoteSortBy) {
    notes.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| match sort_by {
                NoteSortBy::Date => b.updated_at.cmp(&a.updated_at),
                NoteSortBy::Title => compare_titles(&a.title, &b.title),
            })
    });
}

fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Visible folder rows in display order: children appear only under expanded
/// parents, siblings follow the folder store's sort preference.
/// Visible tree rows in display order. A non-empty folder search query keeps
/// only folders whose name contains it plus their ancestors, and opens every
/// kept branch.
pub fn folder_tree(workspace: &Workspace) -> Vec<FolderRow<'_>> {
    let walk = TreeWalk {
        workspace,
        counts: folder_note_counts(workspace),
        latest: latest_activity(workspace),
        shown: filtered_folders(workspace),
    };
    let mut rows = Vec::new();
    let mut visited = HashSet::new();
    walk.push_rows(None, 0, &mut visited, &mut rows);
    rows
}

struct TreeWalk<'a> {
    workspace: &'a Workspace,
    counts: HashMap<FolderId, usize>,
    latest: HashMap<FolderId, OffsetDateTime>,
    shown: Option<HashSet<FolderId>>,
}

impl<'a> TreeWalk<'a> {
    fn push_rows(
        &self,
        parent: Option<FolderId>,
        depth: usize,
        visited: &mut HashSet<FolderId>,
        rows: &mut Vec<FolderRow<'a>>,
    ) {
        let workspace: &'a Workspace = self.workspace;
        let store = &workspace.folders;
        let mut children = store.children(parent);
        if let Some(shown) = &self.shown {
            children.retain(|folder| shown.contains(&folder.id));
        }
        match store.sort_by() {
            FolderSortBy::Manual => {}
            FolderSortBy::Name => children.sort_by(|a, b| compare_titles(&a.name, &b.name)),
            FolderSortBy::Created => children.sort_by_key(|folder| folder.created_at),
            FolderSortBy::Size => children
                .sort_by_key(|folder| std::cmp::Reverse(self.counts.get(&folder.id).copied().unwrap_or(0))),
            FolderSortBy::Modified => children.sort_by(|a, b| {
                let a = self.latest.get(&a.id);
                let b = self.latest.get(&b.id);
                b.cmp(&a)
            }),
        }

        for folder in children {
            if !visited.insert(folder.id) {
                continue;
            }
            let has_children = !store.children(Some(folder.id)).is_empty();
            let expanded = store.is_expanded(folder.id) || self.shown.is_some();
            rows.push(FolderRow {
                folder,
                depth,
                has_children,
                expanded,
                note_count: self.counts.get(&folder.id).copied().unwrap_or(0),
            });
            if has_children && expanded {
                self.push_rows(Some(folder.id), depth + 1, visited, rows);
            }
        }
    }
}

/// `None` when the folder search is empty.
fn filtered_folders(workspace: &Workspace) -> Option<HashSet<FolderId>> {
    let query = workspace.folders.search_query();
    if query.is_empty() {
        return None;
    }
    let needle = query.to_lowercase();
    let store = &workspace.folders;
    let mut shown = HashSet::new();
    for folder in store.folders() {
        if !folder.name.to_lowercase().contains(&needle) {
            continue;
        }
        let mut cursor = Some(folder.id);
        while let Some(id) = cursor {
            if !shown.insert(id) {
                break;
            }
            cursor = store.get(id).and_then(|folder| folder.parent_id);
        }
    }
    Some(shown)
}

/// Most recent note update anywhere in each folder's subtree.
fn latest_activity(workspace: &Workspace) -> HashMap<FolderId, OffsetDateTime> {
    let mut latest: HashMap<FolderId, OffsetDateTime> = HashMap::new();
    for folder in workspace.folders.folders() {
        let subtree = workspace.folders.descendant_ids(folder.id);
        let newest = workspace
            .notes
            .notes()
            .iter()
            .filter(|note| note.folder_id.map(|id| subtree.contains(&id)).unwrap_or(false))
            .map(|note| note.updated_at)
            .max();
        if let Some(newest) = newest {
            latest.insert(folder.id, newest);
        }
    }
    latest
}

/// Recently opened folders that still exist, most recent first.
pub fn recent_folders(workspace: &Workspace) -> Vec<&Folder> {
    workspace
        .folders
        .recent()
        .iter()
        .filter_map(|id| workspace.folders.get(*id))
        .collect()
}

/// Buckets an already ordered list by the `updated_at` calendar period.
/// Group order follows the first note of each bucket.
pub fn group_notes<'a>(notes: &[&'a Note], group_by: GroupBy) -> Vec<NoteGroup<'a>> {
    if group_by == GroupBy::None {
        return vec![NoteGroup {
            label: "All notes".to_string(),
            notes: notes.to_vec(),
        }];
    }
    let mut groups: IndexMap<String, Vec<&'a Note>> = IndexMap::new();
    for note in notes {
        groups
            .entry(period_label(note.updated_at, group_by))
            .or_default()
            .push(note);
    }
    groups
        .into_iter()
        .map(|(label, notes)| NoteGroup { label, notes })
        .collect()
}

fn period_label(at: OffsetDateTime, group_by: GroupBy) -> String {
    let date = at.date();
    match group_by {
        GroupBy::None => String::new(),
        GroupBy::Date => format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ),
        GroupBy::Week => {
            let (year, week, _) = date.to_iso_week_date();
            format!("{year:04}-W{week:02}")
        }
        GroupBy::Month => format!("{:04}-{:02}", date.year(), u8::from(date.month())),
        GroupBy::Year => format!("{:04}", date.year()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FolderDraft, NoteDraft};
    use time::macros::datetime;

    fn workspace_with_tree() -> (Workspace, FolderId, FolderId, FolderId) {
        let mut ws = Workspace::new();
        let root = ws.folders.add_folder(FolderDraft::new("Root", None));
        let child = ws.folders.add_folder(FolderDraft::new("Child", Some(root)));
        let other = ws.folders.add_folder(FolderDraft::new("Other", None));
        ws.notes.add_note(NoteDraft::new("in root", "").in_folder(Some(root)));
        ws.notes.add_note(NoteDraft::new("in child", "").in_folder(Some(child)));
        ws.notes.add_note(NoteDraft::new("in child 2", "").in_folder(Some(child)));
        ws.notes.add_note(NoteDraft::new("unfiled", ""));
        (ws, root, child, other)
    }

    fn backdate(ws: &mut Workspace, title: &str, at: OffsetDateTime) {
        let notes: Vec<Note> = ws
            .notes
            .notes()
            .iter()
            .cloned()
            .map(|mut note| {
                if note.title == title {
                    note.created_at = at;
                    note.updated_at = at;
                }
                note
            })
            .collect();
        ws.notes = crate::store::NoteStore::from_notes(notes);
    }

    #[test]
    fn counts_include_descendants() {
        let (ws, root, child, other) = workspace_with_tree();
        let counts = folder_note_counts(&ws);
        assert_eq!(counts[&root], 3);
        assert_eq!(counts[&child], 2);
        assert_eq!(counts[&other], 0);
    }

    #[test]
    fn orphaned_notes_stay_in_all_notes_only() {
        let (mut ws, root, _, _) = workspace_with_tree();
        ws.folders.delete_folder(root);
        let now = OffsetDateTime::now_utc();
        assert_eq!(visible_notes(&ws, now).len(), 4);
        assert!(!folder_note_counts(&ws).contains_key(&root));
    }

    #[test]
    fn specific_folder_view_is_direct_membership() {
        let (mut ws, root, _, _) = workspace_with_tree();
        ws.folders.select_folder(Some(FolderSelector::Specific(root)));
        let titles: Vec<&str> = visible_notes(&ws, OffsetDateTime::now_utc())
            .iter()
            .map(|n| n.title.as_str())
            .collect();
        assert_eq!(titles, ["in root"]);
    }

    #[test]
    fn search_is_scoped_to_the_selected_folder() {
        let (mut ws, _, child, _) = workspace_with_tree();
        ws.folders.select_folder(Some(FolderSelector::Specific(child)));
        ws.notes.set_search_query("IN");
        let visible = visible_notes(&ws, OffsetDateTime::now_utc());
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|n| n.folder_id == Some(child)));
    }

    #[test]
    fn smart_views_filter_by_flags() {
        let mut ws = Workspace::new();
        let pinned = ws.notes.add_note(NoteDraft::new("p", "").pinned(true));
        let fav = ws.notes.add_note(NoteDraft::new("f", ""));
        ws.notes.toggle_favorite_note(fav);
        ws.notes.add_note(NoteDraft::new("t", "").with_tags(["x"]));
        let now = OffsetDateTime::now_utc();

        let view = |ws: &mut Workspace, selector| {
            ws.folders.select_folder(Some(selector));
            visible_notes(ws, now)
                .iter()
                .map(|n| n.title.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(view(&mut ws, FolderSelector::Pinned), ["p"]);
        assert_eq!(view(&mut ws, FolderSelector::Favorites), ["f"]);
        assert_eq!(view(&mut ws, FolderSelector::Tagged), ["t"]);
        assert!(view(&mut ws, FolderSelector::Trash).is_empty());
        assert!(view(&mut ws, FolderSelector::Archive).is_empty());
        assert_eq!(view(&mut ws, FolderSelector::AllNotes).len(), 3);
        assert_eq!(ws.notes.get(pinned).map(|n| n.is_pinned), Some(true));
    }

    #[test]
    fn recent_view_uses_a_day_window() {
        let mut ws = Workspace::new();
        ws.notes.add_note(NoteDraft::new("fresh", ""));
        ws.notes.add_note(NoteDraft::new("stale", ""));
        let now = OffsetDateTime::now_utc();
        backdate(&mut ws, "stale", now - Duration::hours(30));
        ws.folders.select_folder(Some(FolderSelector::Recent));
        let titles: Vec<&str> = visible_notes(&ws, now).iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["fresh"]);
        assert_eq!(quick_access_counts(&ws, now).recent, 1);
    }

    #[test]
    fn pinned_notes_lead_under_both_sort_keys() {
        let mut ws = Workspace::new();
        ws.notes.add_note(NoteDraft::new("banana", ""));
        ws.notes.add_note(NoteDraft::new("Cherry", "").pinned(true));
        ws.notes.add_note(NoteDraft::new("apple", ""));
        let now = OffsetDateTime::now_utc();
        backdate(&mut ws, "banana", now - Duration::minutes(1));
        backdate(&mut ws, "Cherry", now - Duration::minutes(5));
        backdate(&mut ws, "apple", now - Duration::minutes(10));

        let titles = |ws: &Workspace| {
            visible_notes(ws, now)
                .iter()
                .map(|n| n.title.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(titles(&ws), ["Cherry", "banana", "apple"]);
        ws.ui.set_sort_by(NoteSortBy::Title);
        assert_eq!(titles(&ws), ["Cherry", "apple", "banana"]);
    }

    #[test]
    fn search_mode_ranks_title_hits_first() {
        let mut ws = Workspace::new();
        ws.notes.add_note(NoteDraft::new("Groceries", "milk"));
        ws.notes.add_note(NoteDraft::new("Work", "groceries list"));
        let now = OffsetDateTime::now_utc();
        backdate(&mut ws, "Groceries", now - Duration::hours(2));
        ws.notes.set_search_query("groceries");
        let titles: Vec<&str> = visible_notes(&ws, now).iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Groceries", "Work"]);
    }

    #[test]
    fn pinned_only_toggle_composes_with_folder_scope() {
        let (mut ws, root, _, _) = workspace_with_tree();
        let pinned = ws
            .notes
            .add_note(NoteDraft::new("pinned root", "").in_folder(Some(root)).pinned(true));
        ws.folders.select_folder(Some(FolderSelector::Specific(root)));
        ws.ui.toggle_show_pinned_only();
        let visible = visible_notes(&ws, OffsetDateTime::now_utc());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, pinned);
    }

    #[test]
    fn tree_hides_children_of_collapsed_folders() {
        let (mut ws, root, child, _) = workspace_with_tree();
        let rows = folder_tree(&ws);
        let shape: Vec<(&str, usize)> = rows.iter().map(|r| (r.folder.name.as_str(), r.depth)).collect();
        assert_eq!(shape, [("Root", 0), ("Child", 1), ("Other", 0)]);
        assert!(rows[0].has_children);
        assert_eq!(rows[0].note_count, 3);

        ws.folders.toggle_folder_expanded(root);
        let rows = folder_tree(&ws);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.folder.id != child));
    }

    #[test]
    fn folder_search_keeps_matches_and_their_ancestors() {
        let (mut ws, root, _, _) = workspace_with_tree();
        ws.folders.toggle_folder_expanded(root);
        ws.folders.set_folder_search_query("CHI");
        let shape: Vec<(&str, usize)> = folder_tree(&ws)
            .iter()
            .map(|r| (r.folder.name.as_str(), r.depth))
            .collect();
        assert_eq!(shape, [("Root", 0), ("Child", 1)]);

        ws.folders.set_folder_search_query("");
        assert_eq!(folder_tree(&ws).len(), 2);
    }

    #[test]
    fn tree_can_sort_siblings_by_size_and_name() {
        let (mut ws, _, _, _) = workspace_with_tree();
        ws.folders.set_sort_by(FolderSortBy::Name);
        let roots: Vec<&str> = folder_tree(&ws)
            .iter()
            .filter(|r| r.depth == 0)
            .map(|r| r.folder.name.as_str())
            .collect();
        assert_eq!(roots, ["Other", "Root"]);

        ws.folders.set_sort_by(FolderSortBy::Size);
        let first = folder_tree(&ws)[0].folder.name.clone();
        assert_eq!(first, "Root");
    }

    #[test]
    fn groups_follow_calendar_periods() {
        let mut ws = Workspace::new();
        ws.notes.add_note(NoteDraft::new("a", ""));
        ws.notes.add_note(NoteDraft::new("b", ""));
        ws.notes.add_note(NoteDraft::new("c", ""));
        backdate(&mut ws, "a", datetime!(2024-03-04 10:00 UTC));
        backdate(&mut ws, "b", datetime!(2024-03-06 09:00 UTC));
        backdate(&mut ws, "c", datetime!(2023-12-31 23:00 UTC));
        let notes: Vec<&Note> = ws.notes.notes().iter().collect();

        let weeks = group_notes(&notes, GroupBy::Week);
        let labels: Vec<&str> = weeks.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["2024-W10", "2023-W52"]);
        assert_eq!(weeks[0].notes.len(), 2);

        let years = group_notes(&notes, GroupBy::Year);
        assert_eq!(years.len(), 2);
        let months = group_notes(&notes, GroupBy::Month);
        assert_eq!(months[0].label, "2024-03");
        assert_eq!(group_notes(&notes, GroupBy::None)[0].notes.len(), 3);
    }

    #[test]
    fn recent_folders_skip_deleted_entries() {
        let (mut ws, root, child, other) = workspace_with_tree();
        ws.folders.select_folder(Some(FolderSelector::Specific(child)));
        ws.folders.select_folder(Some(FolderSelector::Specific(other)));
        ws.folders.select_folder(Some(FolderSelector::Specific(root)));
        ws.folders.delete_folder(child);
        let names: Vec<&str> = recent_folders(&ws).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Root", "Other"]);
    }
}
