use std::path::{Path, PathBuf};
use std::time::Instant;

use marknest_tree::{
    filter_to_existing_directories, filter_to_workspace, is_directory, prune_removed,
    rebase_path, translate_on_rename, Entry, PathSet,
};

/// Everything the engine knows about the open workspace.
/// 引擎對目前工作區的完整狀態。
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub root_path: Option<PathBuf>,
    pub entries: Vec<Entry>,
    pub expanded_directories: PathSet,
    pub pinned_directories: PathSet,
    /// Most recent first.
    pub recent_root_paths: Vec<PathBuf>,
    pub last_mutation: Option<Instant>,
    pub collection_directory: Option<PathBuf>,
}

/// Which derived views changed during an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DerivedChanges {
    pub pinned: bool,
    pub expanded: bool,
    pub collection: bool,
}

impl DerivedChanges {
    pub fn any(self) -> bool {
        self.pinned || self.expanded || self.collection
    }
}

impl WorkspaceState {
    /// Total number of entries in the forest.
    pub fn entry_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| 1 + entry.descendant_count())
            .sum()
    }

    /// Whether `path` is the root or a directory of the live tree.
    pub fn is_live_directory(&self, path: &Path) -> bool {
        self.root_path.as_deref() == Some(path) || is_directory(&self.entries, path)
    }

    /// Drops derived paths that left the workspace or no longer name a directory.
    /// 移除已離開工作區或不再是資料夾的衍生路徑。
    pub(crate) fn prune_derived(&mut self) -> DerivedChanges {
        let Some(root) = self.root_path.clone() else {
            return DerivedChanges::default();
        };
        let live = |set: &PathSet| {
            filter_to_existing_directories(&filter_to_workspace(set, &root), &self.entries, &root)
        };
        let pinned = live(&self.pinned_directories);
        let expanded = live(&self.expanded_directories);
        let collection = self
            .collection_directory
            .clone()
            .filter(|dir| self.is_live_directory(dir));
        self.apply(pinned, expanded, collection)
    }

    /// Carries derived paths across a rename or move of `old` to `new`.
    pub(crate) fn translate(&mut self, old: &Path, new: &Path) -> DerivedChanges {
        let pinned = translate_on_rename(&self.pinned_directories, old, new);
        let expanded = translate_on_rename(&self.expanded_directories, old, new);
        let collection = self
            .collection_directory
            .as_deref()
            .map(|dir| rebase_path(dir, old, new).unwrap_or_else(|| dir.to_path_buf()));
        self.apply(pinned, expanded, collection)
    }

    /// Forgets derived paths at or below any of `removed`.
    pub(crate) fn forget_removed(&mut self, removed: &[PathBuf]) -> DerivedChanges {
        let pinned = prune_removed(&self.pinned_directories, removed);
        let expanded = prune_removed(&self.expanded_directories, removed);
        let collection = self
            .collection_directory
            .clone()
            .filter(|dir| !removed.iter().any(|gone| dir.starts_with(gone)));
        self.apply(pinned, expanded, collection)
    }

    fn apply(
        &mut self,
        pinned: PathSet,
        expanded: PathSet,
        collection: Option<PathBuf>,
    ) -> DerivedChanges {
        let changes = DerivedChanges {
            pinned: pinned != self.pinned_directories,
            expanded: expanded != self.expanded_directories,
            collection: collection != self.collection_directory,
        };
        self.pinned_directories = pinned;
        self.expanded_directories = expanded;
        self.collection_directory = collection;
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WorkspaceState {
        WorkspaceState {
            root_path: Some(PathBuf::from("/ws")),
            entries: vec![
                Entry::directory(
                    "/ws/a",
                    vec![Entry::directory("/ws/a/b", Vec::new()), Entry::file("/ws/a/n.md")],
                ),
                Entry::directory("/ws/c", Vec::new()),
            ],
            ..WorkspaceState::default()
        }
    }

    fn set(paths: &[&str]) -> PathSet {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn prune_keeps_root_and_live_directories() {
        let mut state = state();
        state.pinned_directories = set(&["/ws", "/ws/a/b", "/ws/a/n.md", "/ws/gone", "/other"]);
        state.collection_directory = Some(PathBuf::from("/ws/gone"));
        let changes = state.prune_derived();
        assert!(changes.pinned && changes.collection && !changes.expanded);
        assert_eq!(state.pinned_directories, set(&["/ws", "/ws/a/b"]));
        assert_eq!(state.collection_directory, None);
    }

    #[test]
    fn translate_moves_collection_with_its_directory() {
        let mut state = state();
        state.collection_directory = Some(PathBuf::from("/ws/a/b"));
        state.expanded_directories = set(&["/ws/a", "/ws/c"]);
        let changes = state.translate(Path::new("/ws/a"), Path::new("/ws/c/a"));
        assert!(changes.expanded && changes.collection && !changes.pinned);
        assert_eq!(state.collection_directory, Some(PathBuf::from("/ws/c/a/b")));
        assert_eq!(state.expanded_directories, set(&["/ws/c", "/ws/c/a"]));
    }

    #[test]
    fn forget_removed_only_touches_nested_paths() {
        let mut state = state();
        state.pinned_directories = set(&["/ws/a", "/ws/a/b", "/ws/c"]);
        let changes = state.forget_removed(&[PathBuf::from("/ws/a")]);
        assert!(changes.pinned);
        assert_eq!(state.pinned_directories, set(&["/ws/c"]));
    }
}
