use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use marknest_tree::serde_path;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::write_atomic;
use crate::{SettingsError, SettingsRepository};

/// 工作區設定檔格式版本。 / Current on-disk format version of the workspace settings.
pub const WORKSPACE_SETTINGS_VERSION: u32 = 1;

/// 工作區內部設定資料夾名稱（以點開頭，樹狀檢視與監看都會忽略）。 / Hidden directory inside the root that holds per-workspace state.
pub const SETTINGS_DIR: &str = ".marknest";
const SETTINGS_FILE: &str = "workspace.json";

/// 每個工作區保存的設定；路徑皆為相對於根目錄。 / Per-workspace settings; every path is relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default, with = "serde_path::list")]
    pub pinned_directories: Vec<PathBuf>,
    #[serde(default, with = "serde_path::list")]
    pub expanded_directories: Vec<PathBuf>,
    #[serde(
        default,
        with = "serde_path::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_opened_note: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default = "default_version")]
    format_version: u32,
    #[serde(flatten)]
    settings: WorkspaceSettings,
}

fn default_version() -> u32 {
    WORKSPACE_SETTINGS_VERSION
}

/// 將設定寫入 `<root>/.marknest/workspace.json`。 / Stores settings in `<root>/.marknest/workspace.json`.
///
/// 每次寫入都是讀取、修改、寫回，最後寫入者為準。 / Every write is read-modify-write; the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct JsonSettingsStore;

impl JsonSettingsStore {
    pub fn new() -> Self {
        Self
    }

    pub fn settings_path(root: &Path) -> PathBuf {
        root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    fn read(&self, root: &Path) -> Result<WorkspaceSettings, SettingsError> {
        let path = Self::settings_path(root);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: SettingsFile =
                    serde_json::from_str(&contents).map_err(|err| SettingsError::Invalid {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                if file.format_version > WORKSPACE_SETTINGS_VERSION {
                    warn!(
                        path = %path.display(),
                        version = file.format_version,
                        "workspace settings written by a newer version"
                    );
                }
                Ok(file.settings)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(WorkspaceSettings::default()),
            Err(err) => Err(SettingsError::Io(err)),
        }
    }

    fn update(
        &self,
        root: &Path,
        apply: impl FnOnce(&mut WorkspaceSettings),
    ) -> Result<(), SettingsError> {
        let mut settings = self.read(root)?;
        apply(&mut settings);
        let path = Self::settings_path(root);
        let file = SettingsFile {
            format_version: WORKSPACE_SETTINGS_VERSION,
            settings,
        };
        let payload = serde_json::to_vec_pretty(&file).map_err(|err| SettingsError::Invalid {
            path: path.clone(),
            message: err.to_string(),
        })?;
        write_atomic(&path, &payload)?;
        debug!(path = %path.display(), "workspace settings saved");
        Ok(())
    }
}

impl SettingsRepository for JsonSettingsStore {
    fn load_settings(&self, root: &Path) -> Result<WorkspaceSettings, SettingsError> {
        let mut settings = self.read(root)?;
        settings.pinned_directories.retain(|path| is_safe_relative(path));
        settings.expanded_directories.retain(|path| is_safe_relative(path));
        if settings
            .last_opened_note
            .as_deref()
            .is_some_and(|path| !is_safe_relative(path))
        {
            settings.last_opened_note = None;
        }
        Ok(settings)
    }

    fn persist_pinned_directories(&self, root: &Path, dirs: &[PathBuf]) -> Result<(), SettingsError> {
        let relative = relative_list(root, dirs);
        self.update(root, |settings| settings.pinned_directories = relative)
    }

    fn persist_expanded_directories(
        &self,
        root: &Path,
        dirs: &[PathBuf],
    ) -> Result<(), SettingsError> {
        let relative = relative_list(root, dirs);
        self.update(root, |settings| settings.expanded_directories = relative)
    }

    fn persist_last_opened_note(&self, root: &Path, note: Option<&Path>) -> Result<(), SettingsError> {
        let relative = note.and_then(|path| to_relative(root, path));
        self.update(root, |settings| settings.last_opened_note = relative)
    }
}

/// 將絕對路徑轉為相對根目錄的路徑；根目錄本身記為 `.`。 / Makes `path` relative to `root`; the root itself becomes `.`.
pub fn to_relative(root: &Path, path: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(root).ok()?;
    if rest.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(rest.to_path_buf())
    }
}

/// [`to_relative`] 的反向操作。 / Inverse of [`to_relative`].
pub fn to_absolute(root: &Path, relative: &Path) -> PathBuf {
    if relative == Path::new(".") {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn relative_list(root: &Path, dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter().filter_map(|path| to_relative(root, path)).collect()
}

fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persists_paths_relative_to_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let store = JsonSettingsStore::new();

        store
            .persist_pinned_directories(root, &[root.to_path_buf(), root.join("notes/daily")])
            .unwrap();
        store
            .persist_expanded_directories(root, &[root.join("notes")])
            .unwrap();
        store
            .persist_last_opened_note(root, Some(root.join("notes/today.md").as_path()))
            .unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(JsonSettingsStore::settings_path(root)).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["pinned_directories"], serde_json::json!([".", "notes/daily"]));
        assert_eq!(raw["format_version"], 1);

        let loaded = store.load_settings(root).unwrap();
        assert_eq!(loaded.expanded_directories, vec![PathBuf::from("notes")]);
        assert_eq!(loaded.last_opened_note, Some(PathBuf::from("notes/today.md")));
        assert_eq!(to_absolute(root, &loaded.pinned_directories[0]), root.to_path_buf());
    }

    #[test]
    fn escaping_paths_are_dropped_on_load() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let path = JsonSettingsStore::settings_path(root);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"pinned_directories": ["../outside", "/abs", "ok"], "last_opened_note": "../x.md"}"#,
        )
        .unwrap();

        let loaded = JsonSettingsStore::new().load_settings(root).unwrap();
        assert_eq!(loaded.pinned_directories, vec![PathBuf::from("ok")]);
        assert!(loaded.expanded_directories.is_empty());
        assert!(loaded.last_opened_note.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let loaded = JsonSettingsStore::new().load_settings(dir.path()).unwrap();
        assert_eq!(loaded, WorkspaceSettings::default());
    }
}
