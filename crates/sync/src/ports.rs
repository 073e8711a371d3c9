use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Snapshot of the document currently shown in the editor.  
/// 編輯器目前開啟文件的快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocumentRef {
    pub path: PathBuf,
    pub is_dirty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameTabOptions {
    /// Reload the buffer from disk because the engine rewrote the file.
    pub refresh_content: bool,
}

/// Editor-side collaborator that owns tabs and navigation history.  
/// 管理分頁與瀏覽紀錄的編輯器協作者。
///
/// Every path argument may name a directory; implementations apply the call to
/// each tab or history entry equal to or nested under it.
pub trait TabPort: Send + Sync {
    fn open_tab(&self, path: &Path);
    fn close_tab(&self, path: &Path);
    fn rename_tab(&self, old: &Path, new: &Path, options: RenameTabOptions);
    fn update_history_path(&self, old: &Path, new: &Path);
    fn remove_path_from_history(&self, path: &Path);
    fn open_document(&self) -> Option<OpenDocumentRef>;
}

/// Native folder picker.  
/// 原生資料夾選擇對話框。
pub trait DialogPort: Send + Sync {
    fn choose_directory(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// User-facing message, usually rendered as a toast.  
/// 顯示給使用者的提示訊息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => info!(message = %notice.message, "notice"),
            NoticeLevel::Error => warn!(message = %notice.message, "notice"),
        }
    }
}

/// Notifier that only writes to the log.  
/// 僅寫入日誌的通知器。
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {}
