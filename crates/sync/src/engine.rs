use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use marknest_settings::{
    to_absolute, HistoryRepository, SettingsRepository, WorkspaceSettings,
};
use marknest_tree::{build_forest, find, Entry, PathSet};
use parking_lot::RwLock;
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::fs::WorkspaceFs;
use crate::lock::{SubtreeGuard, SubtreeLocks};
use crate::outcome::{ActionError, ActionOutcome, Rejection, ResyncReport};
use crate::ports::{DialogPort, Notice, Notifier, TabPort};
use crate::state::{DerivedChanges, WorkspaceState};

/// Collaborators the engine talks to.
/// 引擎依賴的外部協作者。
#[derive(Clone)]
pub struct EnginePorts {
    pub fs: Arc<dyn WorkspaceFs>,
    pub settings: Arc<dyn SettingsRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub tabs: Arc<dyn TabPort>,
    pub notifier: Arc<dyn Notifier>,
}

/// Keeps the in-memory mirror of one workspace root consistent with the disk.
/// 讓單一工作區的記憶體鏡像與磁碟保持一致。
///
/// Share it behind an `Arc`; every operation takes `&self`. State is only touched
/// in short synchronous sections, never across an `.await`.
pub struct WorkspaceEngine {
    pub(crate) state: RwLock<WorkspaceState>,
    pub(crate) locks: SubtreeLocks,
    pub(crate) ports: EnginePorts,
    pub(crate) config: EngineConfig,
}

/// Internal failure type that lets actions use `?` for both rejections and errors.
pub(crate) enum Failure {
    Rejected(Rejection),
    Error(ActionError),
}

impl From<Rejection> for Failure {
    fn from(rejection: Rejection) -> Self {
        Failure::Rejected(rejection)
    }
}

impl From<ActionError> for Failure {
    fn from(err: ActionError) -> Self {
        Failure::Error(err)
    }
}

impl From<marknest_tree::NameError> for Failure {
    fn from(err: marknest_tree::NameError) -> Self {
        Failure::Error(err.into())
    }
}

impl From<marknest_tree::TreeError> for Failure {
    fn from(err: marknest_tree::TreeError) -> Self {
        Failure::Error(err.into())
    }
}

impl WorkspaceEngine {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let state = WorkspaceState {
            recent_root_paths: ports.history.entries(),
            ..WorkspaceState::default()
        };
        Self {
            state: RwLock::new(state),
            locks: SubtreeLocks::new(),
            ports,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.state.read().clone()
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.state.read().root_path.clone()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state.read().entries.clone()
    }

    pub fn find_entry(&self, path: &Path) -> Option<Entry> {
        find(&self.state.read().entries, path).cloned()
    }

    pub fn pinned_directories(&self) -> Vec<PathBuf> {
        self.state.read().pinned_directories.iter().cloned().collect()
    }

    pub fn expanded_directories(&self) -> Vec<PathBuf> {
        self.state.read().expanded_directories.iter().cloned().collect()
    }

    pub fn collection_directory(&self) -> Option<PathBuf> {
        self.state.read().collection_directory.clone()
    }

    pub fn last_mutation(&self) -> Option<Instant> {
        self.state.read().last_mutation
    }

    /// Whether a mutation was recorded less than `window` ago.
    pub fn within_grace(&self, window: Duration) -> bool {
        self.last_mutation()
            .is_some_and(|instant| instant.elapsed() < window)
    }

    pub(crate) fn mark_mutation(&self) {
        self.state.write().last_mutation = Some(Instant::now());
    }

    pub(crate) fn require_root(&self) -> Result<PathBuf, Rejection> {
        self.root().ok_or(Rejection::NoWorkspace)
    }

    pub(crate) async fn lock(&self, paths: Vec<PathBuf>) -> SubtreeGuard {
        self.locks.acquire(paths).await
    }

    /// Converts an internal result, reporting rejections and errors to the notifier.
    pub(crate) fn finish<T>(
        &self,
        operation: &'static str,
        result: Result<T, Failure>,
    ) -> Result<ActionOutcome<T>, ActionError> {
        match result {
            Ok(value) => Ok(ActionOutcome::Applied(value)),
            Err(Failure::Rejected(rejection)) => {
                debug!(operation, %rejection, "action rejected");
                self.ports.notifier.notify(Notice::error(rejection.to_string()));
                Ok(ActionOutcome::Rejected(rejection))
            }
            Err(Failure::Error(err)) => {
                warn!(operation, error = %err, "action failed");
                self.ports.notifier.notify(Notice::error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Writes the changed derived sets back to the settings repository.
    pub(crate) fn persist_changes(&self, changes: DerivedChanges) {
        if !changes.pinned && !changes.expanded {
            return;
        }
        let (root, pinned, expanded) = {
            let state = self.state.read();
            let Some(root) = state.root_path.clone() else {
                return;
            };
            (
                root,
                state.pinned_directories.iter().cloned().collect::<Vec<_>>(),
                state.expanded_directories.iter().cloned().collect::<Vec<_>>(),
            )
        };
        if changes.pinned {
            if let Err(err) = self.ports.settings.persist_pinned_directories(&root, &pinned) {
                warn!(root = %root.display(), error = %err, "failed to persist pinned directories");
            }
        }
        if changes.expanded {
            if let Err(err) = self.ports.settings.persist_expanded_directories(&root, &expanded) {
                warn!(root = %root.display(), error = %err, "failed to persist expanded directories");
            }
        }
    }

    /// Opens `root` as the workspace, replacing any previous one.
    /// 開啟指定資料夾作為工作區，取代先前的工作區。
    pub async fn open_workspace(
        &self,
        root: &Path,
    ) -> Result<ActionOutcome<ResyncReport>, ActionError> {
        let result = self.open_workspace_inner(root).await;
        self.finish("open workspace", result)
    }

    async fn open_workspace_inner(&self, requested: &Path) -> Result<ResyncReport, Failure> {
        let root = match tokio::fs::canonicalize(requested).await {
            Ok(root) => root,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Rejection::NotFound {
                    path: requested.to_path_buf(),
                }
                .into())
            }
            Err(err) => return Err(ActionError::io("open workspace", requested, err).into()),
        };
        let is_dir = tokio::fs::metadata(&root)
            .await
            .map_err(|err| ActionError::io("open workspace", &root, err))?
            .is_dir();
        if !is_dir {
            return Err(Rejection::NotADirectory { path: root }.into());
        }

        let _guard = self.lock(vec![root.clone()]).await;
        let entries = load_forest(&root).await?;
        let settings = self.ports.settings.load_settings(&root).unwrap_or_else(|err| {
            warn!(root = %root.display(), error = %err, "failed to load workspace settings");
            WorkspaceSettings::default()
        });

        if let Err(err) = self.ports.history.add(&root) {
            warn!(root = %root.display(), error = %err, "failed to record recent workspace");
        }

        let absolute = |paths: &[PathBuf]| -> PathSet {
            paths.iter().map(|rel| to_absolute(&root, rel)).collect()
        };
        let mut state = WorkspaceState {
            root_path: Some(root.clone()),
            entries,
            pinned_directories: absolute(&settings.pinned_directories),
            expanded_directories: absolute(&settings.expanded_directories),
            recent_root_paths: self.ports.history.entries(),
            last_mutation: None,
            collection_directory: None,
        };
        let changes = state.prune_derived();
        let report = ResyncReport {
            entries: state.entry_count(),
            pruned: changes.any(),
        };
        let last_note = settings
            .last_opened_note
            .map(|rel| to_absolute(&root, &rel))
            .filter(|note| find(&state.entries, note).is_some_and(|entry| !entry.is_directory));
        *self.state.write() = state;
        self.persist_changes(changes);

        if let Some(note) = last_note {
            self.ports.tabs.open_tab(&note);
        }
        info!(root = %root.display(), entries = report.entries, "workspace opened");
        Ok(report)
    }

    /// Asks the dialog for a folder; `None` when the user cancelled.
    pub async fn open_workspace_via_dialog(
        &self,
        dialog: &dyn DialogPort,
    ) -> Result<Option<ActionOutcome<ResyncReport>>, ActionError> {
        match dialog.choose_directory() {
            Some(root) => self.open_workspace(&root).await.map(Some),
            None => {
                debug!("workspace selection cancelled");
                Ok(None)
            }
        }
    }

    /// Forgets every per-root piece of state; recent roots survive.
    pub fn close_workspace(&self) {
        let mut state = self.state.write();
        if let Some(root) = state.root_path.take() {
            info!(root = %root.display(), "workspace closed");
        }
        let recent = std::mem::take(&mut state.recent_root_paths);
        *state = WorkspaceState {
            recent_root_paths: recent,
            ..WorkspaceState::default()
        };
    }

    /// Rebuilds the whole forest from disk and prunes every derived view.
    /// 由磁碟完整重建節點樹，並修剪所有衍生檢視。
    pub async fn resync(&self) -> Result<ActionOutcome<ResyncReport>, ActionError> {
        let result = self.resync_inner().await;
        self.finish("resync", result)
    }

    async fn resync_inner(&self) -> Result<ResyncReport, Failure> {
        let root = self.require_root()?;
        let _guard = self.lock(vec![root.clone()]).await;
        let entries = load_forest(&root).await?;
        let (report, changes) = {
            let mut state = self.state.write();
            if state.root_path.as_deref() != Some(root.as_path()) {
                debug!(root = %root.display(), "workspace changed during resync");
                return Err(Rejection::NoWorkspace.into());
            }
            state.entries = entries;
            let changes = state.prune_derived();
            (
                ResyncReport {
                    entries: state.entry_count(),
                    pruned: changes.any(),
                },
                changes,
            )
        };
        self.persist_changes(changes);
        info!(root = %root.display(), entries = report.entries, "workspace resynced");
        Ok(report)
    }

    /// Validates that `dir` is the root or a directory of the live tree; returns the root.
    pub(crate) fn require_live_directory(&self, dir: &Path) -> Result<PathBuf, Rejection> {
        let state = self.state.read();
        let root = state.root_path.clone().ok_or(Rejection::NoWorkspace)?;
        if !dir.starts_with(&root) {
            return Err(Rejection::OutsideWorkspace {
                path: dir.to_path_buf(),
            });
        }
        if !state.is_live_directory(dir) {
            return Err(match find(&state.entries, dir) {
                Some(_) => Rejection::NotADirectory {
                    path: dir.to_path_buf(),
                },
                None => Rejection::NotFound {
                    path: dir.to_path_buf(),
                },
            });
        }
        Ok(root)
    }

    fn update_set(
        &self,
        dir: &Path,
        pinned: bool,
        apply: impl FnOnce(&mut PathSet, PathBuf) -> bool,
    ) -> Result<bool, Failure> {
        self.require_live_directory(dir)?;
        let (result, changed) = {
            let mut state = self.state.write();
            let set = if pinned {
                &mut state.pinned_directories
            } else {
                &mut state.expanded_directories
            };
            let before = set.clone();
            let result = apply(set, dir.to_path_buf());
            (result, *set != before)
        };
        if changed {
            self.persist_changes(DerivedChanges {
                pinned,
                expanded: !pinned,
                collection: false,
            });
        }
        Ok(result)
    }

    /// Pins `dir`; `Applied(true)` when it was not pinned before.
    pub fn pin(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, true, |set, dir| set.insert(dir));
        self.finish("pin", result)
    }

    pub fn unpin(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, true, |set, dir| set.remove(&dir));
        self.finish("unpin", result)
    }

    /// Flips the pin; `Applied(true)` when `dir` is pinned afterwards.
    pub fn toggle_pin(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, true, toggle);
        self.finish("toggle pin", result)
    }

    pub fn expand(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, false, |set, dir| set.insert(dir));
        self.finish("expand", result)
    }

    pub fn collapse(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, false, |set, dir| set.remove(&dir));
        self.finish("collapse", result)
    }

    pub fn toggle_expanded(&self, dir: &Path) -> Result<ActionOutcome<bool>, ActionError> {
        let result = self.update_set(dir, false, toggle);
        self.finish("toggle expanded", result)
    }

    /// Chooses the directory the collection view lists; `None` clears it.
    pub fn set_collection_directory(
        &self,
        dir: Option<&Path>,
    ) -> Result<ActionOutcome<()>, ActionError> {
        let result = match dir {
            Some(dir) => self.require_live_directory(dir).map(|_| ()),
            None => Ok(()),
        };
        let result = result.map_err(Failure::from).map(|()| {
            self.state.write().collection_directory = dir.map(Path::to_path_buf);
        });
        self.finish("set collection", result)
    }

    /// Markdown files directly inside the collection directory, in tree order.
    /// 收藏資料夾內（不含子資料夾）的 Markdown 檔案，依樹狀順序排列。
    pub fn collection_entries(&self) -> Vec<Entry> {
        let state = self.state.read();
        let Some(dir) = state.collection_directory.as_deref() else {
            return Vec::new();
        };
        let siblings = if state.root_path.as_deref() == Some(dir) {
            state.entries.as_slice()
        } else {
            match find(&state.entries, dir) {
                Some(entry) => entry.children(),
                None => return Vec::new(),
            }
        };
        siblings
            .iter()
            .filter(|entry| entry.is_markdown())
            .cloned()
            .collect()
    }

    /// Records `note` as the document to reopen with this workspace.
    pub fn remember_open_note(&self, note: &Path) -> Result<ActionOutcome<()>, ActionError> {
        let result = self.remember_open_note_inner(note);
        self.finish("remember note", result)
    }

    fn remember_open_note_inner(&self, note: &Path) -> Result<(), Failure> {
        let root = self.require_root()?;
        if !note.starts_with(&root) {
            return Err(Rejection::OutsideWorkspace {
                path: note.to_path_buf(),
            }
            .into());
        }
        self.ports
            .settings
            .persist_last_opened_note(&root, Some(note))
            .map_err(ActionError::from)?;
        Ok(())
    }

    pub fn recent_roots(&self) -> Vec<PathBuf> {
        self.ports.history.entries()
    }

    /// Removes `root` from the recent list; `true` when it was listed.
    pub fn forget_recent_root(&self, root: &Path) -> bool {
        let removed = self.ports.history.remove(root).unwrap_or_else(|err| {
            warn!(root = %root.display(), error = %err, "failed to update recent workspaces");
            false
        });
        self.state.write().recent_root_paths = self.ports.history.entries();
        removed
    }
}

fn toggle(set: &mut PathSet, dir: PathBuf) -> bool {
    if set.remove(&dir) {
        false
    } else {
        set.insert(dir);
        true
    }
}

/// Builds the forest on the blocking pool.
pub(crate) async fn load_forest(root: &Path) -> Result<Vec<Entry>, ActionError> {
    let owned = root.to_path_buf();
    task::spawn_blocking(move || build_forest(&owned, &mut HashSet::new()))
        .await
        .map_err(|err| ActionError::io("scan", root, io::Error::other(err)))?
        .map_err(ActionError::from)
}
