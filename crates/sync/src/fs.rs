use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::task;
use tracing::debug;
use walkdir::WalkDir;

/// Disk operations the engine performs, kept behind a trait so tests can observe them.
/// 引擎使用的磁碟操作介面，方便測試時替換與記錄。
#[async_trait]
pub trait WorkspaceFs: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn create_dir(&self, path: &Path) -> io::Result<()>;
    /// Creates an empty file, failing if something already exists at `path`.
    async fn create_new_file(&self, path: &Path) -> io::Result<()>;
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
    async fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Whether `a` and `b` name the same object, e.g. two spellings on a case-insensitive volume.
    async fn is_same_object(&self, a: &Path, b: &Path) -> io::Result<bool>;
    /// Copies a file or a whole directory tree to `to`.
    async fn copy_recursive(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Removes one object.
    async fn trash(&self, path: &Path) -> io::Result<()>;
    /// Removes a batch of objects in one call.
    async fn trash_all(&self, paths: &[PathBuf]) -> io::Result<()>;
}

/// Where deleted objects go.
/// 刪除的項目要送往何處。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// The platform trash / recycle bin.
    #[default]
    Trash,
    Permanent,
}

/// [`WorkspaceFs`] backed by the local disk through `tokio::fs`.
/// 透過 `tokio::fs` 存取本機磁碟的實作。
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    delete_mode: DeleteMode,
}

impl LocalFileSystem {
    pub fn new(delete_mode: DeleteMode) -> Self {
        Self { delete_mode }
    }

    pub fn delete_mode(&self) -> DeleteMode {
        self.delete_mode
    }
}

#[async_trait]
impl WorkspaceFs for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    async fn create_new_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map(drop)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn is_same_object(&self, a: &Path, b: &Path) -> io::Result<bool> {
        same_object(a, b).await
    }

    async fn copy_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        task::spawn_blocking(move || copy_tree(&from, &to))
            .await
            .map_err(io::Error::other)?
    }

    async fn trash(&self, path: &Path) -> io::Result<()> {
        match self.delete_mode {
            DeleteMode::Trash => {
                let path = path.to_path_buf();
                task::spawn_blocking(move || trash::delete(&path).map_err(trash_error))
                    .await
                    .map_err(io::Error::other)?
            }
            DeleteMode::Permanent => remove_permanently(path).await,
        }
    }

    async fn trash_all(&self, paths: &[PathBuf]) -> io::Result<()> {
        match self.delete_mode {
            DeleteMode::Trash => {
                let paths = paths.to_vec();
                task::spawn_blocking(move || trash::delete_all(&paths).map_err(trash_error))
                    .await
                    .map_err(io::Error::other)?
            }
            DeleteMode::Permanent => {
                for path in paths {
                    remove_permanently(path).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
async fn same_object(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let a = tokio::fs::symlink_metadata(a).await?;
    let b = tokio::fs::symlink_metadata(b).await?;
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

#[cfg(not(unix))]
async fn same_object(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(tokio::fs::canonicalize(a).await? == tokio::fs::canonicalize(b).await?)
}

async fn remove_permanently(path: &Path) -> io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

fn trash_error(err: trash::Error) -> io::Error {
    io::Error::other(err.to_string())
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    if !std::fs::metadata(from)?.is_dir() {
        std::fs::copy(from, to)?;
        return Ok(());
    }
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    debug!(from = %from.display(), to = %to.display(), "copied directory tree");
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    let destination = std::fs::read_link(link)?;
    debug!(path = %link.display(), destination = %destination.display(), "recreating symbolic link");
    std::os::unix::fs::symlink(&destination, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> io::Result<()> {
    tracing::warn!(path = %link.display(), "skipping symbolic link during copy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn copy_recursive_duplicates_nested_tree() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("deep/er")).unwrap();
        fs::write(source.join("deep/er/note.md"), "hi").unwrap();

        let target = dir.path().join("dst");
        LocalFileSystem::default()
            .copy_recursive(&source, &target)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(target.join("deep/er/note.md")).unwrap(), "hi");
        assert!(source.join("deep/er/note.md").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copy_recursive_recreates_symlinks() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("real")).unwrap();
        fs::write(source.join("real/note.md"), "hi").unwrap();
        std::os::unix::fs::symlink("real", source.join("alias")).unwrap();

        let target = dir.path().join("dst");
        LocalFileSystem::default()
            .copy_recursive(&source, &target)
            .await
            .unwrap();
        assert_eq!(fs::read_link(target.join("alias")).unwrap(), PathBuf::from("real"));
        assert_eq!(fs::read_to_string(target.join("alias/note.md")).unwrap(), "hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn same_object_tells_distinct_files_apart() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.md"), "lower").unwrap();
        fs::write(dir.path().join("Note.md"), "upper").unwrap();
        let fs_backend = LocalFileSystem::default();
        let lower = dir.path().join("note.md");
        assert!(fs_backend.is_same_object(&lower, &lower).await.unwrap());
        let same = fs_backend
            .is_same_object(&lower, &dir.path().join("Note.md"))
            .await
            .unwrap();
        // A case-insensitive volume stores only one of the two files.
        assert_eq!(same, fs::read_dir(dir.path()).unwrap().count() == 1);
    }

    #[tokio::test]
    async fn create_new_file_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        let fs_backend = LocalFileSystem::new(DeleteMode::Permanent);
        fs_backend.create_new_file(&path).await.unwrap();
        let err = fs_backend.create_new_file(&path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn permanent_delete_removes_files_and_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("folder/inner")).unwrap();
        fs::write(dir.path().join("file.md"), "").unwrap();

        let fs_backend = LocalFileSystem::new(DeleteMode::Permanent);
        fs_backend.trash(&dir.path().join("file.md")).await.unwrap();
        fs_backend
            .trash_all(&[dir.path().join("folder")])
            .await
            .unwrap();
        assert!(!fs_backend.exists(&dir.path().join("file.md")).await);
        assert!(!fs_backend.exists(&dir.path().join("folder")).await);
    }
}
