use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::serde_path;

static UNTITLED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Untitled(?: \d+| \(\d+\)|\d+)?(?:\.(?i:md))?$").expect("untitled pattern")
});

/// One node of the in-memory mirror of the workspace directory.
/// 工作區目錄在記憶體中的鏡像節點（檔案或資料夾）。
///
/// `children` is `Some` exactly when `is_directory` is set; use [`Entry::file`] and
/// [`Entry::directory`] to keep that pairing intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(with = "serde_path")]
    pub path: PathBuf,
    pub name: String,
    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Entry>>,
    /// Creation time in milliseconds since the UNIX epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Modification time in milliseconds since the UNIX epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
}

impl Entry {
    /// Creates a file entry; the name is derived from the last path component.
    /// 建立檔案節點，名稱取自路徑最後一段。
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: file_name_of(&path),
            path,
            is_directory: false,
            children: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Creates a directory entry; `children` is sorted before it is stored.
    /// 建立資料夾節點，子節點會先排序。
    pub fn directory(path: impl Into<PathBuf>, mut children: Vec<Entry>) -> Self {
        let path = path.into();
        sort_entries(&mut children);
        Self {
            name: file_name_of(&path),
            path,
            is_directory: true,
            children: Some(children),
            created_at: None,
            modified_at: None,
        }
    }

    pub fn with_timestamps(mut self, created_at: Option<i64>, modified_at: Option<i64>) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    /// Children of a directory, or an empty slice for files.
    pub fn children(&self) -> &[Entry] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn is_markdown(&self) -> bool {
        !self.is_directory && is_markdown_path(&self.path)
    }

    /// Number of entries below this one (not counting itself).
    /// 計算此節點底下的所有後代數量（不含自身）。
    pub fn descendant_count(&self) -> usize {
        self.children()
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// Depth-first list of this entry's path and every descendant path.
    pub fn collect_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::with_capacity(1 + self.descendant_count());
        collect_into(self, &mut out);
        out
    }
}

fn collect_into(entry: &Entry, out: &mut Vec<PathBuf>) {
    out.push(entry.path.clone());
    for child in entry.children() {
        collect_into(child, out);
    }
}

/// Returns the final path component as a (lossy) string.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Markdown documents are recognised purely by a case-insensitive `.md` suffix.
/// 僅以不分大小寫的 `.md` 副檔名判斷 Markdown 文件。
pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Whether `name` looks like a freshly created, not yet renamed note
/// (`Untitled`, `Untitled 3`, `Untitled (2).md`, ...).
pub fn is_untitled_name(name: &str) -> bool {
    UNTITLED_RE.is_match(name)
}

/// Sibling order: directories first, then untitled notes, then everything else;
/// ties break on the case-sensitive name.
/// 同層排序：資料夾優先、未命名筆記其次，其餘依名稱（區分大小寫）排序。
pub fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_directory, b.is_directory) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => return a.name.cmp(&b.name),
        (false, false) => {}
    }
    match (is_untitled_name(&a.name), is_untitled_name(&b.name)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(compare_entries);
}

/// Checks the sibling-order invariant over a whole forest.
pub fn is_sorted_forest(entries: &[Entry]) -> bool {
    entries
        .windows(2)
        .all(|pair| compare_entries(&pair[0], &pair[1]) != Ordering::Greater)
        && entries.iter().all(|entry| is_sorted_forest(entry.children()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untitled_pattern_variants() {
        for name in ["Untitled", "Untitled.md", "Untitled 3.md", "Untitled (2).MD", "Untitled12"] {
            assert!(is_untitled_name(name), "{name} should be untitled");
        }
        for name in ["untitled.md", "Untitled notes.md", "My Untitled.md", "Untitled 1.txt"] {
            assert!(!is_untitled_name(name), "{name} should not be untitled");
        }
    }

    #[test]
    fn directories_then_untitled_then_names() {
        let mut entries = vec![
            Entry::file("/ws/alpha.md"),
            Entry::file("/ws/Untitled 1.md"),
            Entry::directory("/ws/zeta", Vec::new()),
            Entry::file("/ws/Beta.md"),
            Entry::directory("/ws/Archive", Vec::new()),
            Entry::file("/ws/Untitled.md"),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Archive", "zeta", "Untitled 1.md", "Untitled.md", "Beta.md", "alpha.md"]
        );
        assert!(is_sorted_forest(&entries));
    }

    #[test]
    fn children_present_only_for_directories() {
        let file = Entry::file("/ws/a.md");
        assert!(file.children.is_none());
        assert!(file.children().is_empty());
        let dir = Entry::directory("/ws/docs", vec![Entry::file("/ws/docs/b.md")]);
        assert_eq!(dir.children.as_ref().map(Vec::len), Some(1));
        assert_eq!(dir.collect_paths().len(), 2);
        assert_eq!(dir.descendant_count(), 1);
    }

    #[test]
    fn markdown_detection_is_case_insensitive() {
        assert!(is_markdown_path(Path::new("/ws/a.MD")));
        assert!(is_markdown_path(Path::new("/ws/a.md")));
        assert!(!is_markdown_path(Path::new("/ws/a.markdown")));
        assert!(!Entry::directory("/ws/folder.md", Vec::new()).is_markdown());
    }

    #[test]
    fn serializes_without_children_for_files() {
        let json = serde_json::to_value(Entry::file("/ws/a.md")).unwrap();
        assert!(json.get("children").is_none());
        assert_eq!(json["path"], "/ws/a.md");
    }
}
