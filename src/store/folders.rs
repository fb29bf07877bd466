use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use time::OffsetDateTime;

use crate::model::{Folder, FolderDraft, FolderId, FolderSelector, FolderUpdate};
use crate::store::LookupError;

pub const MAX_RECENT_FOLDERS: usize = 5;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum FolderSortBy {
    Name,
    Modified,
    Created,
    Size,
    #[default]
    Manual,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum GroupBy {
    #[default]
    None,
    Date,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DropPosition {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderRequest {
    pub dragged_id: FolderId,
    pub target_id: FolderId,
    pub position: DropPosition,
}

/// Owns the folder forest plus the navigation state around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderStore {
    folders: Vec<Folder>,
    selected: Option<FolderSelector>,
    expanded: IndexSet<FolderId>,
    recent: Vec<FolderId>,
    #[serde(skip)]
    search_query: String,
    sort_by: FolderSortBy,
    group_by: GroupBy,
}

impl FolderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn get(&self, id: FolderId) -> Option<&Folder> {
        self.folders.iter().find(|folder| folder.id == id)
    }

    pub fn contains(&self, id: FolderId) -> bool {
        self.get(id).is_some()
    }

    pub fn selected(&self) -> Option<FolderSelector> {
        self.selected
    }

    /// The selection with dangling folder ids treated as "nothing selected".
    pub fn effective_selection(&self) -> Option<FolderSelector> {
        match self.selected {
            Some(FolderSelector::Specific(id)) if !self.contains(id) => None,
            other => other,
        }
    }

    pub fn expanded(&self) -> &IndexSet<FolderId> {
        &self.expanded
    }

    pub fn is_expanded(&self, id: FolderId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn recent(&self) -> &[FolderId] {
        &self.recent
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn sort_by(&self) -> FolderSortBy {
        self.sort_by
    }

    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }

    pub fn add_folder(&mut self, draft: FolderDraft) -> FolderId {
        let order = self
            .folders
            .iter()
            .map(|folder| folder.order)
            .max()
            .map_or(0, |max| max + 1);
        let folder = Folder {
            id: FolderId::generate(),
            name: draft.name,
            parent_id: draft.parent_id,
            created_at: OffsetDateTime::now_utc(),
            order,
            is_expanded: true,
            icon: draft.icon,
            color: draft.color,
        };
        let id = folder.id;
        tracing::debug!(%id, name = %folder.name, parent = ?folder.parent_id, "adding folder");
        self.folders.push(folder);
        self.expanded.insert(id);
        id
    }

    pub fn rename_folder(&mut self, id: FolderId, name: impl Into<String>) -> bool {
        match self.folders.iter_mut().find(|folder| folder.id == id) {
            Some(folder) => {
                folder.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Applies a partial update. A reparent that would make the folder its
    /// own ancestor is dropped; the other fields still apply.
    pub fn update_folder(&mut self, id: FolderId, update: FolderUpdate) -> bool {
        let reparent_ok = match update.parent_id {
            Some(Some(parent)) => !self.would_cycle(id, parent),
            _ => true,
        };
        if !reparent_ok {
            tracing::warn!(%id, "refusing reparent that would create a folder cycle");
        }
        let Some(folder) = self.folders.iter_mut().find(|folder| folder.id == id) else {
            return false;
        };
        if let Some(name) = update.name {
            folder.name = name;
        }
        if let Some(icon) = update.icon {
            folder.icon = icon;
        }
        if let Some(color) = update.color {
            folder.color = color;
        }
        if let (Some(parent), true) = (update.parent_id, reparent_ok) {
            folder.parent_id = parent;
        }
        true
    }

    /// Removes the folder and all of its descendants. Notes that
    /// reference the removed ids are left alone; the caller decides whether
    /// to cascade.
    pub fn delete_folder(&mut self, id: FolderId) -> Vec<FolderId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let removed = self.descendant_ids(id);
        self.folders.retain(|folder| !removed.contains(&folder.id));
        self.expanded.retain(|expanded| !removed.contains(expanded));
        self.recent.retain(|recent| !removed.contains(recent));
        let selection_gone = self
            .selected
            .and_then(|selector| selector.folder_id())
            .map(|selected| removed.contains(&selected))
            .unwrap_or(false);
        if selection_gone {
            self.selected = None;
        }
        tracing::debug!(%id, removed = removed.len(), "deleted folder subtree");
        removed
    }

    pub fn select_folder(&mut self, selector: Option<FolderSelector>) {
        self.selected = selector;
        if let Some(FolderSelector::Specific(id)) = selector {
            self.recent.retain(|recent| *recent != id);
            self.recent.insert(0, id);
            self.recent.truncate(MAX_RECENT_FOLDERS);
        }
    }

    /// Returns the new state; unknown ids are ignored and report `false`.
    pub fn toggle_folder_expanded(&mut self, id: FolderId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let expanded = if self.expanded.shift_remove(&id) {
            false
        } else {
            self.expanded.insert(id);
            true
        };
        if let Some(folder) = self.folders.iter_mut().find(|folder| folder.id == id) {
            folder.is_expanded = expanded;
        }
        expanded
    }

    /// Moves `dragged_id` next to `target_id`, adopting the target's parent,
    /// and renumbers that sibling set contiguously from zero.
    pub fn reorder_folders(&mut self, request: ReorderRequest) -> bool {
        let ReorderRequest {
            dragged_id,
            target_id,
            position,
        } = request;
        if dragged_id == target_id {
            return false;
        }
        let (Some(_), Some(target)) = (self.get(dragged_id), self.get(target_id)) else {
            return false;
        };
        let new_parent = target.parent_id;
        if let Some(parent) = new_parent {
            if self.would_cycle(dragged_id, parent) {
                tracing::warn!(%dragged_id, %target_id, "refusing drop inside own subtree");
                return false;
            }
        }

        if let Some(dragged) = self.folders.iter_mut().find(|f| f.id == dragged_id) {
            dragged.parent_id = new_parent;
        }

        let mut siblings: Vec<(i64, usize, FolderId)> = self
            .folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| folder.parent_id == new_parent && folder.id != dragged_id)
            .map(|(index, folder)| (folder.order, index, folder.id))
            .collect();
        siblings.sort();
        let mut ordered: Vec<FolderId> = siblings.into_iter().map(|(_, _, id)| id).collect();
        let target_index = ordered
            .iter()
            .position(|id| *id == target_id)
            .unwrap_or(ordered.len());
        let insert_at = match position {
            DropPosition::Before => target_index,
            DropPosition::After => target_index + 1,
        };
        ordered.insert(insert_at.min(ordered.len()), dragged_id);

        for (order, id) in ordered.iter().enumerate() {
            if let Some(folder) = self.folders.iter_mut().find(|f| f.id == *id) {
                folder.order = order as i64;
            }
        }
        true
    }

    /// Overwrites one folder's manual position without renumbering siblings.
    pub fn set_folder_order(&mut self, id: FolderId, order: i64) -> bool {
        match self.folders.iter_mut().find(|folder| folder.id == id) {
            Some(folder) => {
                folder.order = order;
                true
            }
            None => false,
        }
    }

    pub fn set_folder_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn set_sort_by(&mut self, sort_by: FolderSortBy) {
        self.sort_by = sort_by;
    }

    pub fn set_group_by(&mut self, group_by: GroupBy) {
        self.group_by = group_by;
    }

    /// Direct children in display (`order`, then creation) order.
    pub fn children(&self, parent: Option<FolderId>) -> Vec<&Folder> {
        let mut children: Vec<(usize, &Folder)> = self
            .folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| folder.parent_id == parent)
            .collect();
        children.sort_by_key(|(index, folder)| (folder.order, *index));
        children.into_iter().map(|(_, folder)| folder).collect()
    }

    /// `id` plus every folder below it.
    pub fn descendant_ids(&self, id: FolderId) -> Vec<FolderId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if out.contains(&current) {
                continue;
            }
            out.push(current);
            stack.extend(
                self.folders
                    .iter()
                    .filter(|folder| folder.parent_id == Some(current))
                    .map(|folder| folder.id),
            );
        }
        out
    }

    /// True when `candidate` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, candidate: FolderId, ancestor: FolderId) -> bool {
        let mut cursor = self.get(candidate).and_then(|folder| folder.parent_id);
        let mut hops = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.folders.len() {
                break;
            }
            cursor = self.get(current).and_then(|folder| folder.parent_id);
        }
        false
    }

    pub fn resolve(&self, needle: &str) -> Result<FolderId, LookupError> {
        let exact: Vec<FolderId> = self
            .folders
            .iter()
            .filter(|folder| folder.name.eq_ignore_ascii_case(needle.trim()))
            .map(|folder| folder.id)
            .collect();
        let candidates: Vec<FolderId> = if exact.is_empty() {
            self.folders
                .iter()
                .map(|folder| folder.id)
                .filter(|id| id.matches_prefix(needle))
                .collect()
        } else {
            exact
        };
        match candidates.as_slice() {
            [id] => Ok(*id),
            [] => Err(LookupError::FolderNotFound(needle.to_string())),
            _ => Err(LookupError::Ambiguous {
                needle: needle.to_string(),
                matches: candidates.len(),
            }),
        }
    }

    /// Whether parenting `id` under `new_parent` would close a loop.
    pub fn would_cycle(&self, id: FolderId, new_parent: FolderId) -> bool {
        new_parent == id || self.is_descendant(new_parent, id)
    }
}
