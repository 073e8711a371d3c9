use std::fmt;
use std::io;
use std::path::PathBuf;

use marknest_settings::SettingsError;
use marknest_tree::{NameError, TreeError};
use thiserror::Error;

use crate::pending_save::SaveSettle;

/// Result of an action that passed or failed validation.
/// 操作結果：已套用或在任何 I/O 之前被拒絕。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    Applied(T),
    Rejected(Rejection),
}

impl<T> ActionOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            ActionOutcome::Applied(value) => Some(value),
            ActionOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ActionOutcome::Applied(_) => None,
            ActionOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Why an action was refused before touching the disk.
/// 操作在存取磁碟之前被拒絕的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoWorkspace,
    EmptyName,
    OutsideWorkspace { path: PathBuf },
    NotFound { path: PathBuf },
    NotADirectory { path: PathBuf },
    NameTaken { path: PathBuf },
    /// Moving a directory into itself or one of its descendants.
    IntoItself { source: PathBuf, destination: PathBuf },
    RootIsProtected,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoWorkspace => write!(f, "no workspace is open"),
            Rejection::EmptyName => write!(f, "name must not be empty"),
            Rejection::OutsideWorkspace { path } => {
                write!(f, "{} is outside the workspace", path.display())
            }
            Rejection::NotFound { path } => write!(f, "{} does not exist", path.display()),
            Rejection::NotADirectory { path } => {
                write!(f, "{} is not a directory", path.display())
            }
            Rejection::NameTaken { path } => write!(f, "{} already exists", path.display()),
            Rejection::IntoItself {
                source,
                destination,
            } => write!(
                f,
                "cannot move {} into {}",
                source.display(),
                destination.display()
            ),
            Rejection::RootIsProtected => write!(f, "the workspace root cannot be changed"),
        }
    }
}

/// Failures after validation passed.
/// 通過驗證後發生的錯誤。
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Naming(#[from] NameError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ActionError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ActionError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<TreeError> for ActionError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Io { path, source } => ActionError::io("read", path, source),
        }
    }
}

/// What happened to relative links inside a relocated note.
/// 搬移筆記後相對連結的處理結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFixup {
    /// Not a markdown file, or its directory did not change.
    NotApplicable,
    Unchanged,
    Rewritten(usize),
    /// The relocation committed but the links could not be rewritten.
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub removed: Vec<PathBuf>,
    pub save: SaveSettle,
}

/// Result of a rename or move; `from == to` means nothing needed to change.
/// 重新命名或搬移的結果；`from == to` 表示無需變更。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocated {
    pub from: PathBuf,
    pub to: PathBuf,
    pub save: SaveSettle,
    pub links: LinkFixup,
}

impl Relocated {
    pub(crate) fn unchanged(path: PathBuf) -> Self {
        Self {
            from: path.clone(),
            to: path,
            save: SaveSettle::NotOpen,
            links: LinkFixup::NotApplicable,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copied {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub links: LinkFixup,
}

/// Summary of a full rebuild from disk.
/// 從磁碟完整重建後的摘要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncReport {
    pub entries: usize,
    /// Whether any derived set lost paths during the rebuild.
    pub pruned: bool,
}
