//! Workspace synchronization engine: keeps the in-memory entry forest, the derived
//! directory views and the editor's documents consistent with the disk.
//! 工作區同步引擎：讓記憶體中的節點樹、衍生的資料夾檢視與編輯器文件和磁碟保持一致。

mod actions;
pub mod config;
pub mod document;
pub mod engine;
pub mod fs;
pub mod lock;
pub mod outcome;
pub mod pending_save;
pub mod ports;
pub mod state;
pub mod watcher;

pub use config::{EngineConfig, WatchConfig};
pub use document::{DocumentSession, NavigationHistory, Tab};
pub use engine::{EnginePorts, WorkspaceEngine};
pub use fs::{DeleteMode, LocalFileSystem, WorkspaceFs};
pub use lock::{SubtreeGuard, SubtreeLocks};
pub use outcome::{
    ActionError, ActionOutcome, Copied, Created, Deleted, LinkFixup, Rejection, Relocated,
    ResyncReport,
};
pub use pending_save::{wait_for_pending_save, SaveSettle};
pub use ports::{
    DialogPort, LogNotifier, Notice, NoticeLevel, Notifier, OpenDocumentRef, RenameTabOptions,
    TabPort,
};
pub use state::WorkspaceState;
pub use watcher::{is_ignored, WatchError, WatchEvent, WatchEventKind, WorkspaceWatcher};
