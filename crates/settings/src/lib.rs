//! 工作區設定與最近開啟清單的保存。 / Persistence for per-workspace settings and recent roots.

pub mod recent;
pub mod storage;
pub mod workspace;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use recent::{RecentRoots, DEFAULT_RECENT_ROOTS};
pub use storage::RecentRootsStore;
pub use workspace::{
    to_absolute, to_relative, JsonSettingsStore, WorkspaceSettings, SETTINGS_DIR,
    WORKSPACE_SETTINGS_VERSION,
};

/// 設定讀寫錯誤。 / Errors raised by the settings stores.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid settings file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// 每個工作區的設定儲存介面；所有路徑皆為絕對路徑。 / Per-workspace settings port; callers pass absolute paths.
pub trait SettingsRepository: Send + Sync {
    /// 回傳相對於 `root` 的設定值。 / Returns settings with paths relative to `root`.
    fn load_settings(&self, root: &Path) -> Result<WorkspaceSettings, SettingsError>;
    fn persist_pinned_directories(&self, root: &Path, dirs: &[PathBuf]) -> Result<(), SettingsError>;
    fn persist_expanded_directories(&self, root: &Path, dirs: &[PathBuf])
        -> Result<(), SettingsError>;
    fn persist_last_opened_note(&self, root: &Path, note: Option<&Path>) -> Result<(), SettingsError>;
}

/// 最近開啟工作區清單的儲存介面。 / Port for the recently opened workspace roots.
pub trait HistoryRepository: Send + Sync {
    fn add(&self, root: &Path) -> Result<(), SettingsError>;
    fn remove(&self, root: &Path) -> Result<bool, SettingsError>;
    /// 最近使用者在前。 / Most recent first.
    fn entries(&self) -> Vec<PathBuf>;
}
