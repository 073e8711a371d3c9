//! Filters and translators for the derived directory sets (pinned, expanded).
//! 釘選與展開資料夾集合的篩選與路徑轉換。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::entry::Entry;
use crate::mutation::is_directory;

pub type PathSet = BTreeSet<PathBuf>;

/// `true` when `path` is `root` or nested below it (component-wise).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Swaps the `old_prefix` of `path` for `new_prefix`; `None` when `path` is not under it.
/// 將路徑的舊前綴替換為新前綴；若路徑不在舊前綴底下則回傳 `None`。
pub fn rebase_path(path: &Path, old_prefix: &Path, new_prefix: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(old_prefix).ok()?;
    if rest.as_os_str().is_empty() {
        Some(new_prefix.to_path_buf())
    } else {
        Some(new_prefix.join(rest))
    }
}

pub fn filter_to_workspace(set: &PathSet, root: &Path) -> PathSet {
    set.iter()
        .filter(|path| is_within(path, root))
        .cloned()
        .collect()
}

/// Keeps `root` itself and paths that resolve to a directory entry of `forest`.
pub fn filter_to_existing_directories(set: &PathSet, forest: &[Entry], root: &Path) -> PathSet {
    set.iter()
        .filter(|path| path.as_path() == root || is_directory(forest, path))
        .cloned()
        .collect()
}

/// Rewrites an exact match of `old` and every path nested below it onto `new`.
/// 將等於或位於 `old` 底下的路徑改寫到 `new`。
pub fn translate_on_rename(set: &PathSet, old: &Path, new: &Path) -> PathSet {
    set.iter()
        .map(|path| rebase_path(path, old, new).unwrap_or_else(|| path.clone()))
        .collect()
}

/// Drops every path equal to or nested below one of `removed`.
pub fn prune_removed<P: AsRef<Path>>(set: &PathSet, removed: &[P]) -> PathSet {
    set.iter()
        .filter(|path| !removed.iter().any(|gone| path.starts_with(gone.as_ref())))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(paths: &[&str]) -> PathSet {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn workspace_filter_is_component_aware() {
        let filtered = filter_to_workspace(&set(&["/ws", "/ws/a", "/wsx/b", "/other"]), Path::new("/ws"));
        assert_eq!(filtered, set(&["/ws", "/ws/a"]));
    }

    #[test]
    fn existing_directory_filter() {
        let forest = vec![
            Entry::directory("/ws/a", vec![Entry::directory("/ws/a/b", Vec::new())]),
            Entry::file("/ws/note.md"),
        ];
        let filtered = filter_to_existing_directories(
            &set(&["/ws", "/ws/a/b", "/ws/note.md", "/ws/gone"]),
            &forest,
            Path::new("/ws"),
        );
        assert_eq!(filtered, set(&["/ws", "/ws/a/b"]));
    }

    #[test]
    fn rename_translation_rewrites_nested_paths() {
        let translated = translate_on_rename(
            &set(&["/ws/a", "/ws/a/b", "/ws/ab", "/ws/c"]),
            Path::new("/ws/a"),
            Path::new("/ws/z"),
        );
        assert_eq!(translated, set(&["/ws/z", "/ws/z/b", "/ws/ab", "/ws/c"]));
    }

    #[test]
    fn prune_removes_nested_pins_only() {
        let pruned = prune_removed(
            &set(&["/ws/a", "/ws/a/b", "/ws/ab", "/ws/c"]),
            &[PathBuf::from("/ws/a")],
        );
        assert_eq!(pruned, set(&["/ws/ab", "/ws/c"]));
    }

    #[test]
    fn rebase_path_handles_exact_match() {
        assert_eq!(
            rebase_path(Path::new("/ws/a"), Path::new("/ws/a"), Path::new("/ws/b")),
            Some(PathBuf::from("/ws/b"))
        );
        assert_eq!(rebase_path(Path::new("/ws/ab"), Path::new("/ws/a"), Path::new("/ws/b")), None);
    }
}
