use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// 最近開啟工作區清單的預設容量。 / Default number of remembered workspace roots.
pub const DEFAULT_RECENT_ROOTS: usize = 5;

/// 以最近使用順序保存工作區根目錄。 / Most-recent-first list of workspace roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentRoots {
    capacity: usize,
    entries: VecDeque<PathBuf>,
}

impl Default for RecentRoots {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_ROOTS)
    }
}

impl RecentRoots {
    /// 建立指定容量的清單。 / Creates an empty list with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// 由已保存的資料還原，重複項目只保留第一次出現。 / Restores persisted entries, keeping the first occurrence of duplicates.
    pub fn with_entries(capacity: usize, entries: Vec<PathBuf>) -> Self {
        let mut roots = Self::new(capacity);
        for path in entries {
            if !roots.entries.contains(&path) && roots.entries.len() < roots.capacity {
                roots.entries.push_back(path);
            }
        }
        roots
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 將路徑提升至最前端並修剪超出容量的項目。 / Promotes `path` to the front, evicting the oldest entries past capacity.
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.entries.retain(|existing| existing != &path);
        self.entries.push_front(path);
        self.entries.truncate(self.capacity);
    }

    /// 移除指定路徑；若存在則回傳 `true`。 / Removes `path`, returning `true` when it was tracked.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|existing| existing.as_path() != path);
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.entries.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
