use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Upper bound on candidates tried before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 100;

/// How the collision counter is appended before the extension.
/// 名稱衝突時加在副檔名前的編號格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixStyle {
    /// `note 1.md`
    #[default]
    Spaced,
    /// `note (1).md`
    Parenthesized,
}

/// Per-call options for [`resolve_unique_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NameOptions {
    pub style: SuffixStyle,
    /// Directories never split off an extension (`v1.2` stays whole).
    pub is_directory: bool,
}

impl NameOptions {
    pub fn new(style: SuffixStyle) -> Self {
        Self {
            style,
            is_directory: false,
        }
    }

    pub fn directory(style: SuffixStyle) -> Self {
        Self {
            style,
            is_directory: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("no free name for `{name}` in {directory} after {attempts} attempts")]
    Exhausted {
        name: String,
        directory: PathBuf,
        attempts: u32,
    },
}

/// Splits `name` into stem and extension (the extension keeps its dot).
/// A leading dot belongs to the stem, so `.env` has no extension.
/// 將名稱拆成主檔名與副檔名（副檔名保留句點）。
pub fn split_name(name: &str, is_directory: bool) -> (&str, &str) {
    if is_directory {
        return (name, "");
    }
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Candidate name for the given attempt; attempt 0 is the name itself.
pub fn candidate_name(name: &str, attempt: u32, options: NameOptions) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    let (stem, extension) = split_name(name, options.is_directory);
    match options.style {
        SuffixStyle::Spaced => format!("{stem} {attempt}{extension}"),
        SuffixStyle::Parenthesized => format!("{stem} ({attempt}){extension}"),
    }
}

/// Finds the first path in `directory` for `name` that `exists` reports as free.
/// 依序嘗試候選名稱，回傳第一個不存在的完整路徑。
///
/// Fails with [`NameError::Exhausted`] after [`MAX_NAME_ATTEMPTS`] candidates; there is
/// no safe fallback name at that point.
pub async fn resolve_unique_path<F, Fut>(
    directory: &Path,
    name: &str,
    options: NameOptions,
    mut exists: F,
) -> Result<PathBuf, NameError>
where
    F: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = directory.join(candidate_name(name, attempt, options));
        if !exists(candidate.clone()).await {
            return Ok(candidate);
        }
    }
    Err(NameError::Exhausted {
        name: name.to_string(),
        directory: directory.to_path_buf(),
        attempts: MAX_NAME_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn taken(paths: &[&str]) -> HashSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    async fn resolve(existing: &HashSet<PathBuf>, name: &str, options: NameOptions) -> Result<PathBuf, NameError> {
        resolve_unique_path(Path::new("/ws"), name, options, |candidate| {
            let hit = existing.contains(&candidate);
            async move { hit }
        })
        .await
    }

    #[tokio::test]
    async fn spaced_suffix_skips_taken_names() {
        let existing = taken(&["/ws/note.md", "/ws/note 1.md"]);
        let path = resolve(&existing, "note.md", NameOptions::new(SuffixStyle::Spaced)).await.unwrap();
        assert_eq!(path, PathBuf::from("/ws/note 2.md"));
        assert!(!existing.contains(&path));
    }

    #[tokio::test]
    async fn parenthesized_suffix_for_copies() {
        let existing = taken(&["/ws/report.pdf"]);
        let path = resolve(&existing, "report.pdf", NameOptions::new(SuffixStyle::Parenthesized))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/ws/report (1).pdf"));
    }

    #[tokio::test]
    async fn directories_keep_dots_in_stem() {
        let existing = taken(&["/ws/v1.2"]);
        let path = resolve(&existing, "v1.2", NameOptions::directory(SuffixStyle::Spaced)).await.unwrap();
        assert_eq!(path, PathBuf::from("/ws/v1.2 1"));
    }

    #[tokio::test]
    async fn exhaustion_is_terminal() {
        let err = resolve_unique_path(Path::new("/ws"), "a.md", NameOptions::default(), |_| async { true })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NameError::Exhausted {
                name: "a.md".into(),
                directory: PathBuf::from("/ws"),
                attempts: MAX_NAME_ATTEMPTS,
            }
        );
    }

    #[test]
    fn split_name_cases() {
        assert_eq!(split_name("note.md", false), ("note", ".md"));
        assert_eq!(split_name(".env", false), (".env", ""));
        assert_eq!(split_name("archive.tar.gz", false), ("archive.tar", ".gz"));
        assert_eq!(split_name("plain", false), ("plain", ""));
    }
}
