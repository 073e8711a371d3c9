use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::ports::OpenDocumentRef;

/// How an in-flight save at an affected path resolved.
/// 受影響路徑上未儲存文件的等待結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSettle {
    /// The open document is not at or under the target.
    NotOpen,
    Settled,
    /// Still dirty after the last poll; the caller went ahead anyway.
    TimedOut,
}

/// Polls the open document until its unsaved edits are flushed or `attempts` runs out.
/// 輪詢開啟中的文件，直到未儲存內容寫入或次數用盡。
pub async fn wait_for_pending_save<F>(
    target: &Path,
    mut snapshot: F,
    attempts: u32,
    interval: Duration,
) -> SaveSettle
where
    F: FnMut() -> Option<OpenDocumentRef>,
{
    let affected = |document: &OpenDocumentRef| document.path.starts_with(target);
    match snapshot() {
        Some(document) if affected(&document) => {
            if !document.is_dirty {
                return SaveSettle::Settled;
            }
        }
        _ => return SaveSettle::NotOpen,
    }

    for attempt in 1..=attempts {
        tokio::time::sleep(interval).await;
        match snapshot() {
            Some(document) if affected(&document) && document.is_dirty => {
                debug!(target = %target.display(), attempt, "open document still dirty");
            }
            _ => return SaveSettle::Settled,
        }
    }
    warn!(target = %target.display(), attempts, "pending save did not settle");
    SaveSettle::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn doc(path: &str, is_dirty: bool) -> Option<OpenDocumentRef> {
        Some(OpenDocumentRef {
            path: PathBuf::from(path),
            is_dirty,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_document_returns_immediately() {
        let outcome = wait_for_pending_save(
            Path::new("/ws/a"),
            || doc("/ws/b.md", true),
            10,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(outcome, SaveSettle::NotOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn dirty_document_under_directory_settles() {
        let polls = AtomicU32::new(0);
        let outcome = wait_for_pending_save(
            Path::new("/ws/a"),
            || {
                let seen = polls.fetch_add(1, Ordering::SeqCst);
                doc("/ws/a/note.md", seen < 3)
            },
            10,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(outcome, SaveSettle::Settled);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_ceiling() {
        let polls = AtomicU32::new(0);
        let outcome = wait_for_pending_save(
            Path::new("/ws/note.md"),
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                doc("/ws/note.md", true)
            },
            10,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(outcome, SaveSettle::TimedOut);
        assert_eq!(polls.load(Ordering::SeqCst), 11);
    }
}
