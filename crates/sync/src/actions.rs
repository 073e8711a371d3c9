use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use marknest_tree::{
    build_entry, file_name_of, find, insert, is_markdown_path, load_timestamps, move_entry,
    remove, rename, resolve_unique_path, rewrite_relative_links, update_metadata, Entry,
    MetadataPatch, NameOptions, SuffixStyle,
};
use tracing::{debug, info, warn};

use crate::engine::{Failure, WorkspaceEngine};
use crate::outcome::{
    ActionError, ActionOutcome, Copied, Created, Deleted, LinkFixup, Rejection, Relocated,
};
use crate::pending_save::{wait_for_pending_save, SaveSettle};
use crate::ports::RenameTabOptions;
use crate::state::DerivedChanges;

const DEFAULT_NOTE_NAME: &str = "Untitled";

impl WorkspaceEngine {
    /// Creates a folder named `name` (or `name 1`, `name 2`, ...) inside `parent`.
    /// 在 `parent` 內建立資料夾，名稱衝突時自動加上編號。
    pub async fn create_folder(
        &self,
        parent: &Path,
        name: &str,
    ) -> Result<ActionOutcome<Created>, ActionError> {
        let result = self.create_folder_inner(parent, name).await;
        self.finish("create folder", result)
    }

    async fn create_folder_inner(&self, parent: &Path, name: &str) -> Result<Created, Failure> {
        let root = self.require_root()?;
        let name = clean_name(name)?;
        let _guard = self.lock(vec![parent.to_path_buf()]).await;
        self.require_live_directory(parent)?;

        let path = self
            .unique_path(parent, &name, NameOptions::directory(SuffixStyle::Spaced))
            .await?;
        self.mark_mutation();
        self.ports
            .fs
            .create_dir(&path)
            .await
            .map_err(|err| ActionError::io("create folder", &path, err))?;
        let entry = build_entry(&path)?;
        self.commit_insert(&root, parent, entry);
        info!(path = %path.display(), "folder created");
        Ok(Created { path })
    }

    /// Creates an empty note in `parent`, opens it and expands `parent`.
    /// 在 `parent` 內建立空白筆記、開啟分頁並展開父資料夾。
    ///
    /// Without a name the note is called `Untitled`; `.md` is appended when missing.
    pub async fn create_note(
        &self,
        parent: &Path,
        name: Option<&str>,
    ) -> Result<ActionOutcome<Created>, ActionError> {
        let result = self.create_note_inner(parent, name).await;
        self.finish("create note", result)
    }

    async fn create_note_inner(
        &self,
        parent: &Path,
        name: Option<&str>,
    ) -> Result<Created, Failure> {
        let root = self.require_root()?;
        let mut name = clean_name(name.unwrap_or(DEFAULT_NOTE_NAME))?;
        if !is_markdown_path(Path::new(&name)) {
            name.push_str(".md");
        }
        let _guard = self.lock(vec![parent.to_path_buf()]).await;
        self.require_live_directory(parent)?;

        let path = self
            .unique_path(parent, &name, NameOptions::new(SuffixStyle::Spaced))
            .await?;
        self.mark_mutation();
        self.ports
            .fs
            .create_new_file(&path)
            .await
            .map_err(|err| ActionError::io("create note", &path, err))?;
        let entry = build_entry(&path)?;
        self.commit_insert(&root, parent, entry);

        let expanded = self.state.write().expanded_directories.insert(parent.to_path_buf());
        self.persist_changes(DerivedChanges {
            expanded,
            ..DerivedChanges::default()
        });
        self.ports.tabs.open_tab(&path);
        if let Err(err) = self.ports.settings.persist_last_opened_note(&root, Some(path.as_path())) {
            warn!(path = %path.display(), error = %err, "failed to remember new note");
        }
        info!(path = %path.display(), "note created");
        Ok(Created { path })
    }

    /// Deletes every path in `paths`; small batches go one by one, large ones in bulk.
    /// 刪除多個項目；少量時逐一處理，大量時一次批次送出。
    pub async fn delete_many(
        &self,
        paths: &[PathBuf],
    ) -> Result<ActionOutcome<Deleted>, ActionError> {
        let result = self.delete_many_inner(paths).await;
        self.finish("delete", result)
    }

    async fn delete_many_inner(&self, paths: &[PathBuf]) -> Result<Deleted, Failure> {
        let root = self.require_root()?;
        let targets = outermost(paths);
        if targets.is_empty() {
            return Ok(Deleted {
                removed: Vec::new(),
                save: SaveSettle::NotOpen,
            });
        }
        let _guard = self.lock(targets.clone()).await;
        for target in &targets {
            self.require_entry(&root, target)?;
        }

        let mut save = SaveSettle::NotOpen;
        for target in &targets {
            save = merge_settle(save, self.settle_pending_save(target).await);
        }

        self.mark_mutation();
        let mut removed = Vec::with_capacity(targets.len());
        let failure = if targets.len() < self.config.delete_batch_threshold {
            let mut failure = None;
            for target in &targets {
                match self.ports.fs.trash(target).await {
                    Ok(()) => removed.push(target.clone()),
                    Err(err) => {
                        failure = Some(ActionError::io("delete", target, err));
                        break;
                    }
                }
            }
            failure
        } else {
            match self.ports.fs.trash_all(&targets).await {
                Ok(()) => {
                    removed.extend(targets.iter().cloned());
                    None
                }
                Err(err) => Some(ActionError::io("delete", &root, err)),
            }
        };

        if !removed.is_empty() {
            self.commit_removal(&removed);
        }
        if let Some(err) = failure {
            return Err(err.into());
        }
        info!(count = removed.len(), "entries deleted");
        Ok(Deleted { removed, save })
    }

    /// Renames the entry at `path`; markdown files keep `.md` when `new_name` has no extension.
    /// 重新命名項目；若新名稱沒有副檔名，Markdown 檔案會自動補上 `.md`。
    pub async fn rename_entry(
        &self,
        path: &Path,
        new_name: &str,
    ) -> Result<ActionOutcome<Relocated>, ActionError> {
        let result = self.rename_inner(path, new_name).await;
        self.finish("rename", result)
    }

    async fn rename_inner(&self, path: &Path, new_name: &str) -> Result<Relocated, Failure> {
        let root = self.require_root()?;
        let mut name = clean_name(new_name)?;
        let parent = path
            .parent()
            .ok_or(Rejection::RootIsProtected)?
            .to_path_buf();
        let _guard = self.lock(vec![parent.clone()]).await;
        let entry = self.require_entry(&root, path)?;

        if entry.is_markdown() && Path::new(&name).extension().is_none() {
            name.push_str(".md");
        }
        if name == entry.name {
            debug!(path = %path.display(), "rename to the same name");
            return Ok(Relocated::unchanged(path.to_path_buf()));
        }
        let target = parent.join(&name);
        if find(&self.state.read().entries, &target).is_some() {
            return Err(Rejection::NameTaken { path: target }.into());
        }
        // A case-insensitive volume reports the new spelling as existing; only that is allowed.
        if self.ports.fs.exists(&target).await {
            let case_only = name.to_lowercase() == entry.name.to_lowercase();
            let same_object = case_only
                && self
                    .ports
                    .fs
                    .is_same_object(path, &target)
                    .await
                    .unwrap_or(false);
            if !same_object {
                return Err(Rejection::NameTaken { path: target }.into());
            }
        }

        let save = self.settle_pending_save(path).await;
        self.mark_mutation();
        self.ports
            .fs
            .rename(path, &target)
            .await
            .map_err(|err| ActionError::io("rename", path, err))?;

        let changes = {
            let mut state = self.state.write();
            state.entries = rename(&state.entries, path, &target, &name);
            state.last_mutation = Some(Instant::now());
            state.translate(path, &target)
        };
        self.persist_changes(changes);
        self.follow_documents(&root, path, &target, false);
        info!(from = %path.display(), to = %target.display(), "entry renamed");
        Ok(Relocated {
            from: path.to_path_buf(),
            to: target,
            save,
            links: LinkFixup::NotApplicable,
        })
    }

    /// Moves `source` into `destination_dir`.
    /// 將項目搬移到目的資料夾。
    ///
    /// Only a single moved note has its relative links rewritten. Notes inside a moved
    /// directory keep their text, so links pointing out of that directory may go stale.
    /// 只有單一筆記搬移時才會改寫相對連結；搬移資料夾時內部筆記內容不變，指向資料夾外的連結可能失效。
    pub async fn move_entry(
        &self,
        source: &Path,
        destination_dir: &Path,
    ) -> Result<ActionOutcome<Relocated>, ActionError> {
        let result = self.move_inner(source, destination_dir).await;
        self.finish("move", result)
    }

    async fn move_inner(&self, source: &Path, destination: &Path) -> Result<Relocated, Failure> {
        let root = self.require_root()?;
        if destination.starts_with(source) {
            return Err(Rejection::IntoItself {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
            }
            .into());
        }
        let _guard = self
            .lock(vec![source.to_path_buf(), destination.to_path_buf()])
            .await;
        let entry = self.require_entry(&root, source)?;
        self.require_live_directory(destination)?;

        let old_parent = source.parent().unwrap_or(root.as_path()).to_path_buf();
        if old_parent == destination {
            debug!(path = %source.display(), "already in destination");
            return Ok(Relocated::unchanged(source.to_path_buf()));
        }
        let target = destination.join(&entry.name);
        if self.ports.fs.exists(&target).await {
            return Err(Rejection::NameTaken { path: target }.into());
        }

        let save = self.settle_pending_save(source).await;
        self.mark_mutation();
        self.ports
            .fs
            .rename(source, &target)
            .await
            .map_err(|err| ActionError::io("move", source, err))?;

        let changes = {
            let mut state = self.state.write();
            state.entries = move_entry(&state.entries, source, destination, &root);
            state.translate(source, &target)
        };
        self.persist_changes(changes);

        let links = if entry.is_markdown() {
            self.fix_links(&target, &old_parent, destination).await
        } else {
            LinkFixup::NotApplicable
        };
        self.mark_mutation();
        let refresh = matches!(links, LinkFixup::Rewritten(_));
        self.follow_documents(&root, source, &target, refresh);
        info!(from = %source.display(), to = %target.display(), ?links, "entry moved");
        Ok(Relocated {
            from: source.to_path_buf(),
            to: target,
            save,
            links,
        })
    }

    /// Copies a workspace entry into `destination_dir` as `name (1)` on collision.
    /// 複製項目到目的資料夾，名稱衝突時以 `name (1)` 形式命名。
    pub async fn copy_entry(
        &self,
        source: &Path,
        destination_dir: &Path,
    ) -> Result<ActionOutcome<Copied>, ActionError> {
        let result = self.copy_inner(source, destination_dir).await;
        self.finish("copy", result)
    }

    async fn copy_inner(&self, source: &Path, destination: &Path) -> Result<Copied, Failure> {
        let root = self.require_root()?;
        if destination.starts_with(source) {
            return Err(Rejection::IntoItself {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
            }
            .into());
        }
        let _guard = self
            .lock(vec![source.to_path_buf(), destination.to_path_buf()])
            .await;
        let entry = self.require_entry(&root, source)?;
        self.require_live_directory(destination)?;
        self.copy_into(&root, source, entry.is_directory, destination)
            .await
            .map_err(Failure::from)
    }

    /// Copies objects from outside the workspace (e.g. a drag-in) into `destination_dir`.
    /// 將工作區外的檔案或資料夾（例如拖放）匯入目的資料夾。
    ///
    /// Sources are validated up front; each copy then commits on its own, so a
    /// failure part-way keeps the imports that already landed.
    pub async fn import_external(
        &self,
        sources: &[PathBuf],
        destination_dir: &Path,
    ) -> Result<ActionOutcome<Vec<Copied>>, ActionError> {
        let result = self.import_inner(sources, destination_dir).await;
        self.finish("import", result)
    }

    async fn import_inner(
        &self,
        sources: &[PathBuf],
        destination: &Path,
    ) -> Result<Vec<Copied>, Failure> {
        let root = self.require_root()?;
        let _guard = self.lock(vec![destination.to_path_buf()]).await;
        self.require_live_directory(destination)?;

        let mut kinds = Vec::with_capacity(sources.len());
        for source in sources {
            match tokio::fs::metadata(source).await {
                Ok(metadata) => kinds.push(metadata.is_dir()),
                Err(_) => {
                    return Err(Rejection::NotFound {
                        path: source.clone(),
                    }
                    .into())
                }
            }
            if destination.starts_with(source) {
                return Err(Rejection::IntoItself {
                    source: source.clone(),
                    destination: destination.to_path_buf(),
                }
                .into());
            }
        }

        let mut copied = Vec::with_capacity(sources.len());
        for (source, is_directory) in sources.iter().zip(kinds) {
            copied.push(self.copy_into(&root, source, is_directory, destination).await?);
        }
        Ok(copied)
    }

    async fn copy_into(
        &self,
        root: &Path,
        source: &Path,
        is_directory: bool,
        destination: &Path,
    ) -> Result<Copied, ActionError> {
        let name = file_name_of(source);
        let options = if is_directory {
            NameOptions::directory(SuffixStyle::Parenthesized)
        } else {
            NameOptions::new(SuffixStyle::Parenthesized)
        };
        let target = self.unique_path(destination, &name, options).await?;
        self.mark_mutation();
        self.ports
            .fs
            .copy_recursive(source, &target)
            .await
            .map_err(|err| ActionError::io("copy", source, err))?;
        let entry = build_entry(&target)?;
        self.commit_insert(root, destination, entry);

        let links = match source.parent() {
            Some(old_dir) if !is_directory && is_markdown_path(&target) => {
                self.fix_links(&target, old_dir, destination).await
            }
            _ => LinkFixup::NotApplicable,
        };
        self.mark_mutation();
        info!(from = %source.display(), to = %target.display(), ?links, "entry copied");
        Ok(Copied {
            source: source.to_path_buf(),
            destination: target,
            links,
        })
    }

    async fn unique_path(
        &self,
        directory: &Path,
        name: &str,
        options: NameOptions,
    ) -> Result<PathBuf, ActionError> {
        let fs = Arc::clone(&self.ports.fs);
        let path = resolve_unique_path(directory, name, options, move |candidate| {
            let fs = Arc::clone(&fs);
            async move { fs.exists(&candidate).await }
        })
        .await?;
        Ok(path)
    }

    fn require_entry(&self, root: &Path, path: &Path) -> Result<Entry, Rejection> {
        if path == root {
            return Err(Rejection::RootIsProtected);
        }
        if !path.starts_with(root) {
            return Err(Rejection::OutsideWorkspace {
                path: path.to_path_buf(),
            });
        }
        find(&self.state.read().entries, path)
            .cloned()
            .ok_or_else(|| Rejection::NotFound {
                path: path.to_path_buf(),
            })
    }

    async fn settle_pending_save(&self, target: &Path) -> SaveSettle {
        let tabs = Arc::clone(&self.ports.tabs);
        wait_for_pending_save(
            target,
            move || tabs.open_document(),
            self.config.pending_save_attempts,
            self.config.pending_save_interval,
        )
        .await
    }

    fn commit_insert(&self, root: &Path, parent: &Path, entry: Entry) {
        let mut state = self.state.write();
        state.entries = insert(&state.entries, parent, entry, root);
        state.last_mutation = Some(Instant::now());
    }

    fn commit_removal(&self, removed: &[PathBuf]) {
        let changes = {
            let mut state = self.state.write();
            let gone: HashSet<PathBuf> = removed.iter().cloned().collect();
            state.entries = remove(&state.entries, &gone);
            state.last_mutation = Some(Instant::now());
            state.forget_removed(removed)
        };
        self.persist_changes(changes);
        for path in removed {
            self.ports.tabs.close_tab(path);
            self.ports.tabs.remove_path_from_history(path);
        }
    }

    /// Points tabs, history and the remembered note at the relocated path.
    fn follow_documents(&self, root: &Path, old: &Path, new: &Path, refresh_content: bool) {
        self.ports
            .tabs
            .rename_tab(old, new, RenameTabOptions { refresh_content });
        self.ports.tabs.update_history_path(old, new);
        if let Some(open) = self.ports.tabs.open_document() {
            if open.path.starts_with(new) {
                if let Err(err) = self.ports.settings.persist_last_opened_note(root, Some(open.path.as_path())) {
                    warn!(path = %open.path.display(), error = %err, "failed to remember moved note");
                }
            }
        }
    }

    fn refresh_metadata(&self, path: &Path) {
        let (created_at, modified_at) = load_timestamps(path);
        let mut state = self.state.write();
        state.entries = update_metadata(
            &state.entries,
            path,
            MetadataPatch {
                created_at,
                modified_at,
            },
        );
    }

    /// Rewrites relative links of the markdown file at `file` after it left `old_dir`.
    async fn fix_links(&self, file: &Path, old_dir: &Path, new_dir: &Path) -> LinkFixup {
        if old_dir == new_dir {
            return LinkFixup::Unchanged;
        }
        let text = match self.ports.fs.read_to_string(file).await {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %file.display(), error = %err, "could not read note for link fix-up");
                return LinkFixup::Degraded(err.to_string());
            }
        };
        let rewrite = rewrite_relative_links(&text, old_dir, new_dir);
        if !rewrite.changed() {
            return LinkFixup::Unchanged;
        }
        match self.ports.fs.write(file, &rewrite.text).await {
            Ok(()) => {
                debug!(path = %file.display(), links = rewrite.rewritten, "relative links rewritten");
                self.refresh_metadata(file);
                LinkFixup::Rewritten(rewrite.rewritten)
            }
            Err(err) => {
                warn!(path = %file.display(), error = %err, "could not write rewritten links");
                LinkFixup::Degraded(err.to_string())
            }
        }
    }
}

/// Strips path separators and surrounding whitespace; rejects names that end up empty.
fn clean_name(name: &str) -> Result<String, Rejection> {
    let cleaned: String = name.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(Rejection::EmptyName);
    }
    Ok(cleaned.to_string())
}

/// Deduplicates `paths` and drops those nested under another listed path.
fn outermost(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut sorted: Vec<PathBuf> = paths.to_vec();
    sorted.sort();
    sorted.dedup();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(sorted.len());
    for path in sorted {
        if !kept.iter().any(|outer| path.starts_with(outer)) {
            kept.push(path);
        }
    }
    kept
}

fn merge_settle(current: SaveSettle, next: SaveSettle) -> SaveSettle {
    match (current, next) {
        (SaveSettle::TimedOut, _) | (_, SaveSettle::TimedOut) => SaveSettle::TimedOut,
        (SaveSettle::Settled, _) | (_, SaveSettle::Settled) => SaveSettle::Settled,
        _ => SaveSettle::NotOpen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_name_strips_separators() {
        assert_eq!(clean_name(" a/b\\c ").unwrap(), "abc");
        assert_eq!(clean_name("//"), Err(Rejection::EmptyName));
        assert_eq!(clean_name(".."), Err(Rejection::EmptyName));
    }

    #[test]
    fn outermost_drops_nested_and_duplicate_paths() {
        let paths = ["/ws/a/b", "/ws/a", "/ws/c", "/ws/a", "/ws/ab"]
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        assert_eq!(
            outermost(&paths),
            ["/ws/a", "/ws/ab", "/ws/c"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn timed_out_wins_when_merging() {
        assert_eq!(
            merge_settle(SaveSettle::Settled, SaveSettle::TimedOut),
            SaveSettle::TimedOut
        );
        assert_eq!(
            merge_settle(SaveSettle::NotOpen, SaveSettle::Settled),
            SaveSettle::Settled
        );
    }
}
