use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use marknest_tree::serde_path;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HistoryRepository, RecentRoots, SettingsError};

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct RecentRootsFile(#[serde(with = "serde_path::list")] Vec<PathBuf>);

/// 以 JSON 陣列保存最近開啟的工作區。 / Persists recent workspace roots as a JSON array.
#[derive(Debug)]
pub struct RecentRootsStore {
    path: PathBuf,
    roots: Mutex<RecentRoots>,
}

impl RecentRootsStore {
    /// 載入清單；檔案不存在時回傳空清單。 / Loads the history, starting empty when the file is missing.
    pub fn load(path: impl AsRef<Path>, capacity: usize) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str::<RecentRootsFile>(&contents)
                    .map_err(|err| SettingsError::Invalid {
                        path: path.clone(),
                        message: err.to_string(),
                    })?
                    .0
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(SettingsError::Io(err)),
        };
        Ok(Self {
            path,
            roots: Mutex::new(RecentRoots::with_entries(capacity, entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, roots: &RecentRoots) -> Result<(), SettingsError> {
        let payload = serde_json::to_vec_pretty(&RecentRootsFile(roots.to_vec())).map_err(|err| {
            SettingsError::Invalid {
                path: self.path.clone(),
                message: err.to_string(),
            }
        })?;
        write_atomic(&self.path, &payload)?;
        debug!(path = %self.path.display(), count = roots.len(), "recent roots saved");
        Ok(())
    }
}

impl HistoryRepository for RecentRootsStore {
    fn add(&self, root: &Path) -> Result<(), SettingsError> {
        let mut roots = self.roots.lock();
        roots.add(root);
        self.persist(&roots)
    }

    fn remove(&self, root: &Path) -> Result<bool, SettingsError> {
        let mut roots = self.roots.lock();
        let removed = roots.remove(root);
        if removed {
            self.persist(&roots)?;
        }
        Ok(removed)
    }

    fn entries(&self) -> Vec<PathBuf> {
        self.roots.lock().to_vec()
    }
}

/// 以暫存檔加 rename 的方式原子寫入。 / Writes through a sibling temp file followed by rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn recent_roots_store_persists_entries() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("recent.json");

        {
            let store = RecentRootsStore::load(&store_path, 5).unwrap();
            assert!(store.entries().is_empty());
            store.add(&dir.path().join("alpha")).unwrap();
            store.add(&dir.path().join("beta")).unwrap();
        }

        let store = RecentRootsStore::load(&store_path, 5).unwrap();
        let names: Vec<_> = store
            .entries()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["beta", "alpha"]);

        assert!(store.remove(&dir.path().join("beta")).unwrap());
        let reloaded = RecentRootsStore::load(&store_path, 5).unwrap();
        assert_eq!(reloaded.entries(), vec![dir.path().join("alpha")]);
    }

    #[test]
    fn file_is_a_plain_json_array() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("recent.json");
        let store = RecentRootsStore::load(&store_path, 5).unwrap();
        store.add(Path::new("/notes")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&store_path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!(["/notes"]));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("recent.json");
        fs::write(&store_path, "{not json").unwrap();
        assert!(matches!(
            RecentRootsStore::load(&store_path, 5),
            Err(SettingsError::Invalid { .. })
        ));
    }
}
