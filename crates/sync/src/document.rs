use std::path::{Path, PathBuf};

use marknest_tree::rebase_path;
use parking_lot::Mutex;

use crate::ports::{OpenDocumentRef, RenameTabOptions, TabPort};

/// Back/forward list of opened paths.
/// 可前後瀏覽的開啟紀錄。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationHistory {
    entries: Vec<PathBuf>,
    cursor: Option<usize>,
}

impl NavigationHistory {
    /// Records a visit, dropping any forward entries.
    /// 記錄一次瀏覽，並捨棄目前位置之後的紀錄。
    pub fn visit(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.current() == Some(path.as_path()) {
            return;
        }
        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        self.entries.truncate(keep);
        self.entries.push(path);
        self.cursor = Some(self.entries.len() - 1);
    }

    pub fn current(&self) -> Option<&Path> {
        self.cursor
            .and_then(|cursor| self.entries.get(cursor))
            .map(PathBuf::as_path)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn can_go_back(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor + 1 < self.entries.len())
    }

    pub fn back(&mut self) -> Option<&Path> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor = self.cursor.map(|cursor| cursor - 1);
        self.current()
    }

    pub fn forward(&mut self) -> Option<&Path> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor = self.cursor.map(|cursor| cursor + 1);
        self.current()
    }

    /// Rewrites entries equal to or nested under `old`.
    /// 改寫等於或位於 `old` 底下的紀錄。
    pub fn rebase(&mut self, old: &Path, new: &Path) {
        for entry in &mut self.entries {
            if let Some(rebased) = rebase_path(entry, old, new) {
                *entry = rebased;
            }
        }
        self.collapse_repeats();
    }

    /// Drops entries equal to or nested under `path`, keeping the cursor on a
    /// surviving neighbour.
    /// 移除等於或位於 `path` 底下的紀錄，游標移到仍存在的相鄰項目。
    pub fn prune(&mut self, path: &Path) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let mut next_cursor = None;
        let mut kept = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.drain(..).enumerate() {
            if entry.starts_with(path) {
                continue;
            }
            if index <= cursor {
                next_cursor = Some(kept.len());
            }
            kept.push(entry);
        }
        self.entries = kept;
        self.cursor = match next_cursor {
            Some(index) => Some(index),
            None if self.entries.is_empty() => None,
            None => Some(0),
        };
        self.collapse_repeats();
    }

    fn collapse_repeats(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let mut next_cursor = 0;
        let mut kept: Vec<PathBuf> = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.drain(..).enumerate() {
            if kept.last() != Some(&entry) {
                kept.push(entry);
            }
            if index == cursor {
                next_cursor = kept.len() - 1;
            }
        }
        self.entries = kept;
        self.cursor = Some(next_cursor);
    }
}

/// An editor tab.
/// 編輯器分頁。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub path: PathBuf,
    pub is_dirty: bool,
    /// Set when the file changed on disk underneath the buffer.
    pub needs_reload: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    tabs: Vec<Tab>,
    active: Option<usize>,
    history: NavigationHistory,
}

/// In-memory tab/document collaborator used by the CLI and tests.
/// 供命令列與測試使用的記憶體內分頁協作者。
#[derive(Debug, Default)]
pub struct DocumentSession {
    state: Mutex<SessionState>,
}

impl DocumentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.state.lock().tabs.clone()
    }

    pub fn active_path(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        state.active.map(|index| state.tabs[index].path.clone())
    }

    pub fn history(&self) -> NavigationHistory {
        self.state.lock().history.clone()
    }

    /// Flags the tab at `path` as having unsaved edits (or not).
    /// 設定分頁是否有未儲存的變更。
    pub fn set_dirty(&self, path: &Path, dirty: bool) -> bool {
        let mut state = self.state.lock();
        match state.tabs.iter_mut().find(|tab| tab.path == path) {
            Some(tab) => {
                tab.is_dirty = dirty;
                true
            }
            None => false,
        }
    }

    pub fn go_back(&self) -> Option<PathBuf> {
        let mut state = self.state.lock();
        let target = state.history.back()?.to_path_buf();
        activate(&mut state, &target);
        Some(target)
    }

    pub fn go_forward(&self) -> Option<PathBuf> {
        let mut state = self.state.lock();
        let target = state.history.forward()?.to_path_buf();
        activate(&mut state, &target);
        Some(target)
    }
}

fn activate(state: &mut SessionState, path: &Path) {
    let index = match state.tabs.iter().position(|tab| tab.path == path) {
        Some(index) => index,
        None => {
            state.tabs.push(Tab {
                path: path.to_path_buf(),
                is_dirty: false,
                needs_reload: false,
            });
            state.tabs.len() - 1
        }
    };
    state.active = Some(index);
}

impl TabPort for DocumentSession {
    fn open_tab(&self, path: &Path) {
        let mut state = self.state.lock();
        activate(&mut state, path);
        state.history.visit(path);
    }

    fn close_tab(&self, path: &Path) {
        let mut state = self.state.lock();
        let active_path = state.active.map(|index| state.tabs[index].path.clone());
        state.tabs.retain(|tab| !tab.path.starts_with(path));
        state.active = active_path
            .and_then(|active| state.tabs.iter().position(|tab| tab.path == active))
            .or_else(|| state.tabs.len().checked_sub(1));
    }

    fn rename_tab(&self, old: &Path, new: &Path, options: RenameTabOptions) {
        let mut state = self.state.lock();
        for tab in &mut state.tabs {
            if let Some(rebased) = rebase_path(&tab.path, old, new) {
                tab.path = rebased;
                if options.refresh_content {
                    tab.needs_reload = true;
                }
            }
        }
    }

    fn update_history_path(&self, old: &Path, new: &Path) {
        self.state.lock().history.rebase(old, new);
    }

    fn remove_path_from_history(&self, path: &Path) {
        self.state.lock().history.prune(path);
    }

    fn open_document(&self) -> Option<OpenDocumentRef> {
        let state = self.state.lock();
        let tab = state.tabs.get(state.active?)?;
        Some(OpenDocumentRef {
            path: tab.path.clone(),
            is_dirty: tab.is_dirty,
        })
    }
}
