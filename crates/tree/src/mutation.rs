//! Pure forest transforms. Every function takes the current forest by reference and
//! returns a new one; callers swap the result in.
//! 純函式的樹狀轉換：輸入目前的節點樹，回傳新的節點樹。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::entry::{sort_entries, Entry};
use crate::path_set::rebase_path;

/// Timestamp fields to merge into an entry; `None` leaves the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

/// Finds the entry at `path`.
/// 依路徑尋找節點。
pub fn find<'a>(forest: &'a [Entry], path: &Path) -> Option<&'a Entry> {
    for entry in forest {
        if entry.path == path {
            return Some(entry);
        }
        if entry.is_directory && path.starts_with(&entry.path) {
            return find(entry.children(), path);
        }
    }
    None
}

pub fn contains(forest: &[Entry], path: &Path) -> bool {
    find(forest, path).is_some()
}

pub fn is_directory(forest: &[Entry], path: &Path) -> bool {
    find(forest, path).is_some_and(|entry| entry.is_directory)
}

/// Inserts `entry` under `parent`, or into the root-level list when `parent` is `root`.
/// Inserting a path that already exists is a no-op, as is inserting under a parent
/// that is not a directory of the forest.
/// 將節點插入指定父資料夾；若路徑已存在則不做任何變更。
pub fn insert(forest: &[Entry], parent: &Path, entry: Entry, root: &Path) -> Vec<Entry> {
    if contains(forest, &entry.path) {
        return forest.to_vec();
    }
    if parent == root {
        let mut next = forest.to_vec();
        next.push(entry);
        sort_entries(&mut next);
        return next;
    }
    forest
        .iter()
        .map(|node| insert_below(node, parent, &entry))
        .collect()
}

fn insert_below(node: &Entry, parent: &Path, entry: &Entry) -> Entry {
    if !node.is_directory || !parent.starts_with(&node.path) {
        return node.clone();
    }
    let mut updated = node.clone();
    if node.path == parent {
        let children = updated.children.get_or_insert_with(Vec::new);
        children.push(entry.clone());
        sort_entries(children);
    } else {
        updated.children = Some(
            node.children()
                .iter()
                .map(|child| insert_below(child, parent, entry))
                .collect(),
        );
    }
    updated
}

/// Drops every entry whose path is in `paths`, together with its descendants.
/// 移除指定路徑的節點（連同其所有後代）。
pub fn remove(forest: &[Entry], paths: &HashSet<PathBuf>) -> Vec<Entry> {
    forest
        .iter()
        .filter(|entry| !paths.contains(&entry.path))
        .map(|entry| {
            if entry.is_directory && !entry.children().is_empty() {
                let mut updated = entry.clone();
                updated.children = Some(remove(entry.children(), paths));
                updated
            } else {
                entry.clone()
            }
        })
        .collect()
}

/// Renames the entry at `old_path`, rewriting descendant paths of a directory and
/// re-sorting the sibling list it ends up in.
/// 重新命名節點；資料夾的後代路徑一併改寫，並重新排序所在的同層清單。
///
/// When `new_path` lives under a different parent the entry is relocated there; a
/// parent that is not a directory of the forest is treated as the root-level list.
/// An occupied `new_path` leaves the forest unchanged.
pub fn rename(forest: &[Entry], old_path: &Path, new_path: &Path, new_name: &str) -> Vec<Entry> {
    let Some(current) = find(forest, old_path) else {
        return forest.to_vec();
    };
    if new_path != old_path && contains(forest, new_path) {
        return forest.to_vec();
    }
    let mut renamed = rebase_entry(current, old_path, new_path);
    renamed.name = new_name.to_string();

    if old_path.parent() == new_path.parent() {
        return replace_in(forest, old_path, &renamed);
    }

    let without = remove(forest, &HashSet::from([old_path.to_path_buf()]));
    match new_path.parent() {
        Some(parent) if is_directory(&without, parent) => {
            without.iter().map(|node| insert_below(node, parent, &renamed)).collect()
        }
        _ => {
            let mut next = without;
            next.push(renamed);
            sort_entries(&mut next);
            next
        }
    }
}

fn replace_in(list: &[Entry], old_path: &Path, replacement: &Entry) -> Vec<Entry> {
    let mut touched = false;
    let mut next: Vec<Entry> = list
        .iter()
        .map(|entry| {
            if entry.path == old_path {
                touched = true;
                replacement.clone()
            } else if entry.is_directory && old_path.starts_with(&entry.path) {
                let mut updated = entry.clone();
                updated.children = Some(replace_in(entry.children(), old_path, replacement));
                updated
            } else {
                entry.clone()
            }
        })
        .collect();
    if touched {
        sort_entries(&mut next);
    }
    next
}

/// Moves the entry at `source` into `destination_dir`, re-rooting its subtree.
/// 將節點搬移到目的資料夾，並改寫整棵子樹的路徑。
///
/// The workspace root is not an entry of the forest, so a destination equal to `root`
/// targets the root-level list.
pub fn move_entry(forest: &[Entry], source: &Path, destination_dir: &Path, root: &Path) -> Vec<Entry> {
    let Some(current) = find(forest, source) else {
        return forest.to_vec();
    };
    let Some(name) = source.file_name() else {
        return forest.to_vec();
    };
    let target = destination_dir.join(name);
    if target == source || contains(forest, &target) {
        return forest.to_vec();
    }
    let moved = rebase_entry(current, source, &target);
    let without = remove(forest, &HashSet::from([source.to_path_buf()]));
    insert(&without, destination_dir, moved, root)
}

/// Merges timestamps into the entry at `path` only.
pub fn update_metadata(forest: &[Entry], path: &Path, patch: MetadataPatch) -> Vec<Entry> {
    forest
        .iter()
        .map(|entry| {
            if entry.path == path {
                let mut updated = entry.clone();
                if patch.created_at.is_some() {
                    updated.created_at = patch.created_at;
                }
                if patch.modified_at.is_some() {
                    updated.modified_at = patch.modified_at;
                }
                updated
            } else if entry.is_directory && path.starts_with(&entry.path) {
                let mut updated = entry.clone();
                updated.children = Some(update_metadata(entry.children(), path, patch));
                updated
            } else {
                entry.clone()
            }
        })
        .collect()
}

/// Returns a copy of `entry` with `old_prefix` swapped for `new_prefix` on itself and
/// every descendant.
pub fn rebase_entry(entry: &Entry, old_prefix: &Path, new_prefix: &Path) -> Entry {
    let mut rebased = entry.clone();
    if let Some(path) = rebase_path(&entry.path, old_prefix, new_prefix) {
        rebased.path = path;
    }
    if let Some(children) = entry.children.as_ref() {
        rebased.children = Some(
            children
                .iter()
                .map(|child| rebase_entry(child, old_prefix, new_prefix))
                .collect(),
        );
    }
    rebased
}
