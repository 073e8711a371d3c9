//! Relative link fix-up for markdown documents whose containing directory changed.
//! 文件所在資料夾變更後，修正其中的 Markdown 相對連結。

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static INLINE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"!?\[(?:[^\[\]\n]|\[[^\]\n]*\])*\]\(\s*(<[^>\n]*>|(?:[^\s()]|\([^\s()]*\))+)(?:\s+(?:"[^"\n]*"|'[^'\n]*'))?\s*\)"#,
    )
    .expect("inline link pattern")
});

static REFERENCE_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ ]{0,3}\[[^\]\n^][^\]\n]*\]:[ \t]*(<[^>\n]*>|\S+)")
        .expect("reference definition pattern")
});

static FENCED_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n]*\n.*?```|~~~[^\n]*\n.*?~~~").expect("fenced code pattern")
});

static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("inline code pattern"));

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("scheme pattern"));

/// Outcome of [`rewrite_relative_links`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRewrite {
    pub text: String,
    /// Number of link targets that changed.
    pub rewritten: usize,
}

impl LinkRewrite {
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

/// Re-expresses every relative link target of `text` so it keeps pointing at the same
/// file after the document moved from `old_dir` to `new_dir`.
/// 文件由 `old_dir` 移至 `new_dir` 後，重新計算所有相對連結使其仍指向原目標。
///
/// Inline links, images and reference definitions (`[id]: target`) are covered.
/// Absolute paths, URLs, bare `#anchors` and links inside code are left alone; a
/// trailing `#fragment` or `?query` is preserved. When nothing changes the text is
/// returned byte-for-byte.
pub fn rewrite_relative_links(text: &str, old_dir: &Path, new_dir: &Path) -> LinkRewrite {
    if old_dir == new_dir {
        return LinkRewrite {
            text: text.to_string(),
            rewritten: 0,
        };
    }

    let excluded = excluded_ranges(text);
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let captures = INLINE_LINK_RE
        .captures_iter(text)
        .chain(REFERENCE_DEF_RE.captures_iter(text));
    for captures in captures {
        let (Some(whole), Some(target)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if excluded
            .iter()
            .any(|&(start, end)| whole.start() >= start && whole.start() < end)
        {
            continue;
        }
        if let Some(replacement) = rewrite_target(target.as_str(), old_dir, new_dir) {
            edits.push((target.start(), target.end(), replacement));
        }
    }
    edits.sort_by_key(|&(start, _, _)| start);
    let mut last_end = 0;
    edits.retain(|&(start, end, _)| {
        let keep = start >= last_end;
        if keep {
            last_end = end;
        }
        keep
    });

    if edits.is_empty() {
        return LinkRewrite {
            text: text.to_string(),
            rewritten: 0,
        };
    }

    let mut out = String::with_capacity(text.len() + edits.len() * 4);
    let mut cursor = 0;
    for (start, end, replacement) in &edits {
        out.push_str(&text[cursor..*start]);
        out.push_str(replacement);
        cursor = *end;
    }
    out.push_str(&text[cursor..]);
    LinkRewrite {
        text: out,
        rewritten: edits.len(),
    }
}

fn rewrite_target(raw: &str, old_dir: &Path, new_dir: &Path) -> Option<String> {
    let angled = raw.starts_with('<') && raw.ends_with('>') && raw.len() >= 2;
    let target = if angled { &raw[1..raw.len() - 1] } else { raw };
    if !is_relative_target(target) {
        return None;
    }

    let split = target.find(['#', '?']).unwrap_or(target.len());
    let (path_part, suffix) = target.split_at(split);
    if path_part.is_empty() {
        return None;
    }

    let resolved = normalize(&old_dir.join(path_part));
    let mut relative = relative_link(&normalize(new_dir), &resolved);
    if path_part.starts_with("./") && !relative.starts_with("../") {
        relative = format!("./{relative}");
    }
    if relative == path_part {
        return None;
    }

    let updated = format!("{relative}{suffix}");
    if angled || updated.contains(char::is_whitespace) {
        Some(format!("<{updated}>"))
    } else {
        Some(updated)
    }
}

fn is_relative_target(target: &str) -> bool {
    !(target.is_empty()
        || target.starts_with('#')
        || target.starts_with('/')
        || target.starts_with('\\')
        || SCHEME_RE.is_match(target))
}

/// Builds a `/`-separated link from `from_dir` to `target`; both must be absolute.
/// 計算由 `from_dir` 指向 `target` 的相對連結（以 `/` 分隔）。
pub fn relative_link(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = target.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat("..".to_string()).take(from.len() - common));
    parts.extend(
        to[common..]
            .iter()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Lexically resolves `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn excluded_ranges(text: &str) -> Vec<(usize, usize)> {
    FENCED_CODE_RE
        .find_iter(text)
        .chain(INLINE_CODE_RE.find_iter(text))
        .map(|m| (m.start(), m.end()))
        .collect()
}
