use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct LockTable {
    next_id: u64,
    held: Vec<(u64, Vec<PathBuf>)>,
}

#[derive(Debug, Default)]
struct Inner {
    table: Mutex<LockTable>,
    released: Notify,
}

/// Async lock keyed by directory subtrees.
/// 以子樹為單位的非同步鎖。
///
/// Two requests conflict when any of their paths is equal to, an ancestor of, or a
/// descendant of a path the other holds. Conflicting requests wait; disjoint
/// subtrees proceed concurrently.
#[derive(Debug, Clone, Default)]
pub struct SubtreeLocks {
    inner: Arc<Inner>,
}

/// Releases its paths when dropped.
#[derive(Debug)]
pub struct SubtreeGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl SubtreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, paths: Vec<PathBuf>) -> SubtreeGuard {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if let Some(guard) = self.try_acquire(&paths) {
                return guard;
            }
            released.await;
        }
    }

    pub fn try_acquire(&self, paths: &[PathBuf]) -> Option<SubtreeGuard> {
        let mut table = self.inner.table.lock();
        let busy = table
            .held
            .iter()
            .any(|(_, held)| held.iter().any(|h| paths.iter().any(|p| overlaps(h, p))));
        if busy {
            return None;
        }
        table.next_id += 1;
        let id = table.next_id;
        table.held.push((id, paths.to_vec()));
        Some(SubtreeGuard {
            inner: Arc::clone(&self.inner),
            id,
        })
    }
}

impl Drop for SubtreeGuard {
    fn drop(&mut self) {
        self.inner.table.lock().held.retain(|(id, _)| *id != self.id);
        self.inner.released.notify_waiters();
    }
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
