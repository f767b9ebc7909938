//! Single-owner item collection and selection set.
//!
//! All status changes go through [`ItemStore::update_item_status`] or
//! [`ItemStore::update_multiple_items_status`], which consult the transition
//! table in [`Status::apply`] and drop anything it rejects.

use std::collections::HashSet;

use crate::{
    items::{Item, ItemKind, Stage, Status, Step},
    view,
};

/// Partial update for one item, keyed by item key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPatch {
    pub step: Option<Step>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub progress: Option<u8>,
}

impl ItemPatch {
    pub fn step(step: Step) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }

    pub fn progress(pct: u8) -> Self {
        Self {
            progress: Some(pct),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

#[derive(Debug, Default)]
pub struct ItemStore {
    items: Vec<Item>,
    selection: HashSet<String>,
}

impl ItemStore {
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn selection(&self) -> &HashSet<String> {
        &self.selection
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.key == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append items, skipping keys that already exist. Returns how many were added.
    pub fn insert(&mut self, items: impl IntoIterator<Item = Item>) -> usize {
        let mut added = 0;
        for item in items {
            if self.get(&item.key).is_some() {
                tracing::debug!("item {} already listed", item.key);
                continue;
            }
            self.items.push(item);
            added += 1;
        }
        added
    }

    /// Apply a patch. Returns `false` when the key is unknown or the step is
    /// not a legal transition from the item's current status.
    pub fn update_item_status(&mut self, key: &str, patch: ItemPatch) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.key == key) else {
            tracing::debug!("patch for unknown item {key} dropped");
            return false;
        };

        if let Some(step) = patch.step {
            let Some(next) = item.status.apply(item.kind, step) else {
                tracing::warn!("ignoring {step:?} for {key} in status {}", item.status);
                return false;
            };
            item.status = next;
            match step {
                Step::Start(Stage::Upload) | Step::Fail(Stage::Upload) => item.progress = Some(0),
                Step::Succeed(Stage::Upload) => item.progress = Some(100),
                _ => {}
            }
        } else if let Some(pct) = patch.progress {
            // Late progress from a settled upload must not resurrect a bar.
            if item.status.is_in_flight() {
                item.progress = Some(pct.min(100));
            }
            return true;
        }

        if let Some(id) = patch.id.filter(|id| !id.is_empty()) {
            item.id = id;
        }
        if let Some(title) = patch.title.filter(|t| !t.is_empty()) {
            item.title = title;
        }
        if let Some(content) = patch.content {
            item.content = content;
        }
        true
    }

    /// Apply the same step to several items. Returns the keys that moved.
    pub fn update_multiple_items_status(&mut self, keys: &[String], step: Step) -> Vec<String> {
        keys.iter()
            .filter(|key| self.update_item_status(key, ItemPatch::step(step)))
            .cloned()
            .collect()
    }

    /// Replace the whole collection, e.g. after an archive was parsed.
    pub fn replace_all(&mut self, items: Vec<Item>) {
        self.items = items;
        self.selection.clear();
    }

    /// Append a folder's children right after the folder and its existing members.
    pub fn append_children(&mut self, folder_key: &str, children: Vec<Item>) -> usize {
        let Some(folder) = self.get(folder_key) else {
            return 0;
        };
        let group = folder.group_key.clone();
        let fresh: Vec<Item> = children
            .into_iter()
            .filter(|c| self.get(&c.key).is_none())
            .map(|mut c| {
                c.kind = ItemKind::Other;
                c.status = Status::UploadDone;
                c.group_key = group.clone();
                c
            })
            .collect();
        let added = fresh.len();

        let at = self
            .items
            .iter()
            .rposition(|i| i.key == folder_key || (group.is_some() && i.group_key == group))
            .map(|p| p + 1)
            .unwrap_or(self.items.len());
        self.items.splice(at..at, fresh);

        if let Some(folder) = self.items.iter_mut().find(|i| i.key == folder_key) {
            folder.expanded = true;
        }
        added
    }

    /// Remove items by key. Successful items are immutable and stay.
    pub fn remove(&mut self, keys: &[String]) -> usize {
        let before = self.items.len();
        self.items
            .retain(|i| i.status == Status::Success || !keys.contains(&i.key));
        for key in keys {
            if self.get(key).is_none() {
                self.selection.remove(key);
            }
        }
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.selection.clear();
    }

    pub fn set_expanded(&mut self, key: &str, expanded: bool) {
        if let Some(item) = self.items.iter_mut().find(|i| i.key == key) {
            item.expanded = expanded;
        }
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selection.contains(key)
    }

    /// Toggle one item. Folders toggle their whole group atomically.
    pub fn toggle_selection(&mut self, key: &str) {
        let Some(item) = self.get(key) else {
            return;
        };
        if item.kind == ItemKind::Folder
            && let Some(group) = item.group_key.clone()
        {
            self.selection = view::toggle_group(&self.items, &self.selection, &group);
            return;
        }
        if !self.selection.remove(key) {
            self.selection.insert(key.to_string());
        }
    }

    /// Select everything, or clear the selection when everything is selected.
    pub fn toggle_all(&mut self) {
        if view::is_all_selected(&self.items, &self.selection) {
            self.selection.clear();
        } else {
            self.selection = self.items.iter().map(|i| i.key.clone()).collect();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}
