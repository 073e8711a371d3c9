use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::entry::{sort_entries, Entry};
use crate::TreeError;

/// Builds the sorted entry forest for everything below `root`.
/// 走訪 `root` 底下所有項目並建立排序後的節點樹。
///
/// `visited` collects canonical directory paths; a directory reached a second time
/// (typically through a symbolic link) keeps an empty child list instead of recursing.
/// Only a failure to list `root` itself is reported as an error; unreadable subtrees
/// are logged and left empty.
pub fn build_forest(root: &Path, visited: &mut HashSet<PathBuf>) -> Result<Vec<Entry>, TreeError> {
    let listing = fs::read_dir(root).map_err(|source| TreeError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    visited.insert(canonical_or_self(root));
    Ok(collect_children(root, listing, visited))
}

/// Materialises a single file or directory subtree, e.g. after it was created or copied.
/// 為單一檔案或資料夾（含子樹）建立節點，常用於新建或複製之後。
pub fn build_entry(path: &Path) -> Result<Entry, TreeError> {
    let metadata = fs::metadata(path).map_err(|source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_dir() {
        let mut visited = HashSet::new();
        visited.insert(canonical_or_self(path));
        Ok(Entry::directory(path, read_children(path, &mut visited)))
    } else {
        let (created, modified) = timestamps(&metadata);
        Ok(Entry::file(path).with_timestamps(created, modified))
    }
}

/// Best-effort creation/modification timestamps for `path`.
pub fn load_timestamps(path: &Path) -> (Option<i64>, Option<i64>) {
    match fs::metadata(path) {
        Ok(metadata) => timestamps(&metadata),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to stat entry");
            (None, None)
        }
    }
}

fn read_children(dir: &Path, visited: &mut HashSet<PathBuf>) -> Vec<Entry> {
    match fs::read_dir(dir) {
        Ok(listing) => collect_children(dir, listing, visited),
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to read directory; leaving it empty");
            Vec::new()
        }
    }
}

fn collect_children(
    dir: &Path,
    listing: fs::ReadDir,
    visited: &mut HashSet<PathBuf>,
) -> Vec<Entry> {
    let mut entries = Vec::new();
    for item in listing {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read directory entry");
                continue;
            }
        };
        let name = item.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = dir.join(&name);
        // `fs::metadata` follows symlinks so linked directories are walked as directories.
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to stat entry");
                entries.push(Entry::file(path));
                continue;
            }
        };
        if metadata.is_dir() {
            if visited.insert(canonical_or_self(&path)) {
                let children = read_children(&path, visited);
                entries.push(Entry::directory(path, children));
            } else {
                debug!(path = %path.display(), "directory already visited; not descending");
                entries.push(Entry::directory(path, Vec::new()));
            }
        } else {
            let (created, modified) = timestamps(&metadata);
            entries.push(Entry::file(path).with_timestamps(created, modified));
        }
    }
    sort_entries(&mut entries);
    entries
}

fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn timestamps(metadata: &Metadata) -> (Option<i64>, Option<i64>) {
    (
        metadata.created().ok().map(unix_millis),
        metadata.modified().ok().map(unix_millis),
    )
}

fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::is_sorted_forest;
    use tempfile::tempdir;

    #[test]
    fn skips_dotfiles_and_sorts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("notes/deep")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("Untitled.md"), "").unwrap();
        fs::write(root.join(".hidden.md"), "").unwrap();
        fs::write(root.join("notes/deep/c.md"), "c").unwrap();

        let forest = build_forest(root, &mut HashSet::new()).unwrap();
        let names: Vec<_> = forest.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "Untitled.md", "b.md"]);
        assert!(is_sorted_forest(&forest));

        let deep = &forest[0].children()[0];
        assert_eq!(deep.path, root.join("notes/deep"));
        assert_eq!(deep.children()[0].path, root.join("notes/deep/c.md"));
        assert!(forest[2].modified_at.is_some());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = build_forest(&dir.path().join("absent"), &mut HashSet::new()).unwrap_err();
        assert!(matches!(err, TreeError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_terminate() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("a")).unwrap();
        std::os::unix::fs::symlink(root, root.join("a/loop")).unwrap();

        let forest = build_forest(root, &mut HashSet::new()).unwrap();
        let looped = &forest[0].children()[0];
        assert_eq!(looped.name, "loop");
        assert!(looped.is_directory);
        assert!(looped.children().is_empty());
    }

    #[test]
    fn build_entry_materialises_subtree() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("folder");
        fs::create_dir_all(folder.join("inner")).unwrap();
        fs::write(folder.join("inner/x.md"), "x").unwrap();

        let entry = build_entry(&folder).unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.descendant_count(), 2);

        let file = build_entry(&folder.join("inner/x.md")).unwrap();
        assert!(file.children.is_none());
        assert!(file.modified_at.is_some());
    }
}
