#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marknest_settings::{JsonSettingsStore, RecentRootsStore};
use marknest_sync::{
    DeleteMode, DialogPort, DocumentSession, EngineConfig, EnginePorts, LocalFileSystem, Notice,
    Notifier, WorkspaceEngine, WorkspaceFs,
};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Local disk backend that records every call it receives.
/// Calls matching a `fail_on` rule return an error instead of touching the disk.
pub struct RecordingFs {
    inner: LocalFileSystem,
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, Option<PathBuf>)>>,
}

impl RecordingFs {
    pub fn new() -> Self {
        Self {
            inner: LocalFileSystem::new(DeleteMode::Permanent),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|call| *call == op).count()
    }

    /// Makes `op` fail, for every path or only for `path`.
    pub fn fail_on(&self, op: &str, path: Option<&Path>) {
        self.failures
            .lock()
            .push((op.to_string(), path.map(Path::to_path_buf)));
    }

    fn record(&self, op: &str, path: &Path) -> io::Result<()> {
        self.calls.lock().push(op.to_string());
        let failing = self.failures.lock().iter().any(|(rule, only)| {
            rule == op && only.as_deref().map_or(true, |only| only == path)
        });
        if failing {
            return Err(io::Error::other("disk full"));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceFs for RecordingFs {
    async fn exists(&self, path: &Path) -> bool {
        let _ = self.record("exists", path);
        self.inner.exists(path).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.record("create_dir", path)?;
        self.inner.create_dir(path).await
    }

    async fn create_new_file(&self, path: &Path) -> io::Result<()> {
        self.record("create_new_file", path)?;
        self.inner.create_new_file(path).await
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.record("read_to_string", path)?;
        self.inner.read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.record("write", path)?;
        self.inner.write(path, contents).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", from)?;
        self.inner.rename(from, to).await
    }

    async fn is_same_object(&self, a: &Path, b: &Path) -> io::Result<bool> {
        self.record("is_same_object", a)?;
        self.inner.is_same_object(a, b).await
    }

    async fn copy_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("copy_recursive", from)?;
        self.inner.copy_recursive(from, to).await
    }

    async fn trash(&self, path: &Path) -> io::Result<()> {
        self.record("trash", path)?;
        self.inner.trash(path).await
    }

    async fn trash_all(&self, paths: &[PathBuf]) -> io::Result<()> {
        let first = paths.first().map(PathBuf::as_path).unwrap_or(Path::new(""));
        self.record("trash_all", first)?;
        self.inner.trash_all(paths).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

pub struct FixedDialog(pub Option<PathBuf>);

impl DialogPort for FixedDialog {
    fn choose_directory(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

pub struct Harness {
    pub workspace: TempDir,
    pub config_dir: TempDir,
    pub engine: Arc<WorkspaceEngine>,
    pub fs: Arc<RecordingFs>,
    pub session: Arc<DocumentSession>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: Arc<JsonSettingsStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            pending_save_interval: Duration::from_millis(1),
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let workspace = tempfile::tempdir().expect("workspace dir");
        let config_dir = tempfile::tempdir().expect("config dir");
        Self::with_dirs(workspace, config_dir, config)
    }

    pub fn with_dirs(workspace: TempDir, config_dir: TempDir, config: EngineConfig) -> Self {
        let fs = Arc::new(RecordingFs::new());
        let session = Arc::new(DocumentSession::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = Arc::new(JsonSettingsStore::new());
        let history = Arc::new(
            RecentRootsStore::load(config_dir.path().join("recent.json"), 5)
                .expect("recent roots"),
        );
        let engine = Arc::new(WorkspaceEngine::new(
            EnginePorts {
                fs: fs.clone(),
                settings: settings.clone(),
                history,
                tabs: session.clone(),
                notifier: notifier.clone(),
            },
            config,
        ));
        Self {
            workspace,
            config_dir,
            engine,
            fs,
            session,
            notifier,
            settings,
        }
    }

    /// Opens the workspace and returns its canonical root.
    pub async fn open(&self) -> PathBuf {
        let outcome = self
            .engine
            .open_workspace(self.workspace.path())
            .await
            .expect("open workspace");
        assert!(outcome.applied().is_some(), "workspace should open");
        self.fs.clear();
        self.engine.root().expect("root")
    }

    pub fn root(&self) -> PathBuf {
        self.engine.root().expect("root")
    }
}

pub fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, contents).expect("write file");
}
