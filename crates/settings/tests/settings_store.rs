use std::path::{Path, PathBuf};

use marknest_settings::{
    to_absolute, HistoryRepository, JsonSettingsStore, RecentRootsStore, SettingsRepository,
};
use tempfile::tempdir;

#[test]
fn writes_to_one_key_keep_the_others() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path();
    let store = JsonSettingsStore::new();

    store
        .persist_pinned_directories(root, &[root.join("inbox")])
        .expect("pin");
    store
        .persist_expanded_directories(root, &[root.join("inbox"), root.join("archive")])
        .expect("expand");
    store
        .persist_last_opened_note(root, Some(root.join("inbox/todo.md").as_path()))
        .expect("note");
    store.persist_last_opened_note(root, None).expect("clear note");

    let settings = store.load_settings(root).expect("load");
    assert_eq!(settings.pinned_directories, vec![PathBuf::from("inbox")]);
    assert_eq!(
        settings.expanded_directories,
        vec![PathBuf::from("inbox"), PathBuf::from("archive")]
    );
    assert!(settings.last_opened_note.is_none());
}

#[test]
fn paths_outside_root_are_not_persisted() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("ws");
    std::fs::create_dir(&root).unwrap();
    let store = JsonSettingsStore::new();

    store
        .persist_pinned_directories(&root, &[temp.path().join("other"), root.join("keep")])
        .expect("pin");
    let settings = store.load_settings(&root).expect("load");
    let absolute: Vec<PathBuf> = settings
        .pinned_directories
        .iter()
        .map(|rel| to_absolute(&root, rel))
        .collect();
    assert_eq!(absolute, vec![root.join("keep")]);
}

#[test]
fn recent_roots_cap_is_applied_on_add() {
    let temp = tempdir().expect("tempdir");
    let store = RecentRootsStore::load(temp.path().join("recent.json"), 5).expect("load");
    for index in 0..7 {
        store.add(Path::new(&format!("/ws/{index}"))).expect("add");
    }
    let entries = store.entries();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries.first(), Some(&PathBuf::from("/ws/6")));
    assert_eq!(entries.last(), Some(&PathBuf::from("/ws/2")));
}
