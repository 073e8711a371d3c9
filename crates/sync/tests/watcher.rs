mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{write, Harness};
use marknest_sync::{WatchConfig, WatchEvent, WatchEventKind, WorkspaceWatcher};
use tokio::time::timeout;

fn quick(grace_window: Duration) -> WatchConfig {
    WatchConfig {
        settle_delay: Duration::from_millis(20),
        grace_window,
    }
}

fn created(path: PathBuf) -> WatchEvent {
    WatchEvent {
        paths: vec![path],
        kind: WatchEventKind::Created,
    }
}

#[tokio::test]
async fn a_burst_of_events_triggers_one_resync() {
    let h = Harness::new();
    let root = h.open().await;
    let mut watcher = WorkspaceWatcher::detached(h.engine.clone(), quick(Duration::ZERO));

    for index in 0..5 {
        let path = root.join(format!("ext{index}.md"));
        write(&path, "");
        watcher.inject(created(path));
    }

    let report = timeout(Duration::from_secs(5), watcher.next_resync())
        .await
        .expect("resync within timeout")
        .expect("watcher alive");
    assert_eq!(report.entries, 5);
    assert!(h.engine.find_entry(&root.join("ext4.md")).is_some());
    assert!(timeout(Duration::from_millis(200), watcher.next_resync()).await.is_err());
    watcher.stop();
}

#[tokio::test]
async fn echoes_of_own_mutations_are_ignored() {
    let h = Harness::new();
    let root = h.open().await;
    let mut watcher = WorkspaceWatcher::detached(h.engine.clone(), quick(Duration::from_secs(60)));

    let created_note = h.engine.create_note(&root, None).await.unwrap().applied().unwrap();
    watcher.inject(created(created_note.path));

    assert!(timeout(Duration::from_millis(200), watcher.next_resync()).await.is_err());
}

#[tokio::test]
async fn hidden_paths_do_not_trigger_a_resync() {
    let h = Harness::new();
    let root = h.open().await;
    let mut watcher = WorkspaceWatcher::detached(h.engine.clone(), quick(Duration::ZERO));

    watcher.inject(created(root.join(".marknest/workspace.json")));
    watcher.inject(created(PathBuf::from("/somewhere/else.md")));

    assert!(timeout(Duration::from_millis(200), watcher.next_resync()).await.is_err());
}

#[tokio::test]
async fn native_watcher_sees_external_writes() {
    let h = Harness::new();
    let root = h.open().await;
    let mut watcher = WorkspaceWatcher::start(
        h.engine.clone(),
        WatchConfig {
            settle_delay: Duration::from_millis(50),
            grace_window: Duration::ZERO,
        },
    )
    .expect("start watcher");

    tokio::time::sleep(Duration::from_millis(50)).await;
    write(&root.join("from-outside.md"), "# hi");

    let report = timeout(Duration::from_secs(10), watcher.next_resync())
        .await
        .expect("resync within timeout")
        .expect("watcher alive");
    assert!(report.entries >= 1);
    assert!(h.engine.find_entry(&root.join("from-outside.md")).is_some());
}

#[tokio::test]
async fn starting_without_a_workspace_fails() {
    let h = Harness::new();
    assert!(WorkspaceWatcher::start(h.engine.clone(), WatchConfig::default()).is_err());
}
