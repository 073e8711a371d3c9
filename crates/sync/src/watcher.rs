use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::engine::WorkspaceEngine;
use crate::outcome::{ActionOutcome, ResyncReport};

/// 監看工作區時可能回傳的錯誤。 / Errors raised while setting up the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("no workspace is open")]
    NoWorkspace,
}

/// 監控到的事件種類。 / Classifies observed file system changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
    Renamed { from: PathBuf, to: PathBuf },
    Other,
}

/// 檔案事件的詳細資料。 / One raw notification with every path it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub paths: Vec<PathBuf>,
    pub kind: WatchEventKind,
}

/// 判斷事件是否只涉及隱藏路徑。 / Whether every path of the event sits under a dot-prefixed segment below `root`.
pub fn is_ignored(event: &WatchEvent, root: &Path) -> bool {
    event.paths.iter().all(|path| is_hidden_below(path, root))
}

fn is_hidden_below(path: &Path, root: &Path) -> bool {
    let Ok(rest) = path.strip_prefix(root) else {
        return true;
    };
    rest.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn map_event(event: notify::Event) -> Option<WatchEvent> {
    if event.paths.is_empty() {
        return None;
    }
    let kind = match event.kind {
        EventKind::Access(_) => return None,
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => {
            WatchEventKind::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            }
        }
        EventKind::Modify(_) => WatchEventKind::Modified,
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Remove(_) => WatchEventKind::Removed,
        _ => WatchEventKind::Other,
    };
    Some(WatchEvent {
        paths: event.paths,
        kind,
    })
}

/// 將外部變更轉為完整重新同步。 / Turns bursts of external changes into full resyncs.
///
/// Events are dropped when they only touch hidden paths or arrive inside the grace
/// window after the engine's own last mutation. A qualifying event starts a settle
/// period; once no further event arrives for `settle_delay` the engine resyncs.
pub struct WorkspaceWatcher {
    _watcher: Option<RecommendedWatcher>,
    events: UnboundedSender<WatchEvent>,
    reports: UnboundedReceiver<ResyncReport>,
    task: JoinHandle<()>,
}

impl WorkspaceWatcher {
    /// 開始監看目前開啟的工作區。 / Starts watching the engine's current root recursively.
    pub fn start(engine: Arc<WorkspaceEngine>, config: WatchConfig) -> Result<Self, WatchError> {
        let root = engine.root().ok_or(WatchError::NoWorkspace)?;
        let mut watcher = Self::detached(engine, config);
        let tx = watcher.events.clone();
        let mut native = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(mapped) = map_event(event) {
                        let _ = tx.send(mapped);
                    }
                }
                Err(err) => warn!(error = %err, "watch error"),
            },
            Config::default(),
        )?;
        native.watch(&root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "watching workspace");
        watcher._watcher = Some(native);
        Ok(watcher)
    }

    /// 建立不連接原生監看的實例，事件需透過 [`Self::inject`] 送入。 / Runs the debounce loop without a native watcher; feed it with [`Self::inject`].
    pub fn detached(engine: Arc<WorkspaceEngine>, config: WatchConfig) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(engine, config, events_rx, reports_tx));
        Self {
            _watcher: None,
            events,
            reports,
            task,
        }
    }

    /// 手動送入事件。 / Pushes an event as if the native watcher reported it.
    pub fn inject(&self, event: WatchEvent) {
        let _ = self.events.send(event);
    }

    /// 等待下一次重新同步完成。 / Waits for the next completed resync.
    pub async fn next_resync(&mut self) -> Option<ResyncReport> {
        self.reports.recv().await
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for WorkspaceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    engine: Arc<WorkspaceEngine>,
    config: WatchConfig,
    mut events: UnboundedReceiver<WatchEvent>,
    reports: UnboundedSender<ResyncReport>,
) {
    while let Some(event) = events.recv().await {
        if !qualifies(&engine, &config, &event) {
            continue;
        }
        debug!(kind = ?event.kind, "external change detected");
        loop {
            match timeout(config.settle_delay, events.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        match engine.resync().await {
            Ok(ActionOutcome::Applied(report)) => {
                let _ = reports.send(report);
            }
            Ok(ActionOutcome::Rejected(rejection)) => {
                debug!(%rejection, "resync skipped");
            }
            Err(err) => warn!(error = %err, "resync failed"),
        }
    }
}

fn qualifies(engine: &WorkspaceEngine, config: &WatchConfig, event: &WatchEvent) -> bool {
    let Some(root) = engine.root() else {
        return false;
    };
    if is_ignored(event, &root) {
        return false;
    }
    if engine.within_grace(config.grace_window) {
        debug!("event inside grace window");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(paths: &[&str]) -> WatchEvent {
        WatchEvent {
            paths: paths.iter().map(PathBuf::from).collect(),
            kind: WatchEventKind::Modified,
        }
    }

    #[test]
    fn hidden_segments_below_root_are_ignored() {
        let root = Path::new("/home/u/.notes");
        assert!(!is_ignored(&event(&["/home/u/.notes/a.md"]), root));
        assert!(is_ignored(&event(&["/home/u/.notes/.marknest/workspace.json"]), root));
        assert!(is_ignored(&event(&["/home/u/.notes/dir/.hidden"]), root));
        assert!(is_ignored(&event(&["/elsewhere/a.md"]), root));
        assert!(!is_ignored(
            &event(&["/home/u/.notes/.git/x", "/home/u/.notes/b.md"]),
            root
        ));
    }

    #[test]
    fn access_events_are_dropped() {
        let raw = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/ws/a.md"));
        assert!(map_event(raw).is_none());

        let renamed = notify::Event::new(EventKind::Modify(ModifyKind::Name(
            notify::event::RenameMode::Both,
        )))
        .add_path(PathBuf::from("/ws/a.md"))
        .add_path(PathBuf::from("/ws/b.md"));
        assert_eq!(
            map_event(renamed).unwrap().kind,
            WatchEventKind::Renamed {
                from: PathBuf::from("/ws/a.md"),
                to: PathBuf::from("/ws/b.md"),
            }
        );
    }
}
