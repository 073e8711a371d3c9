//! Entry forest model and the pure algorithms that keep it in step with the disk.
//! 工作區節點樹模型，以及讓它與磁碟保持一致的純演算法。

pub mod builder;
pub mod entry;
pub mod links;
pub mod mutation;
pub mod naming;
pub mod path_set;
pub mod serde_path;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use builder::{build_entry, build_forest, load_timestamps};
pub use entry::{
    compare_entries, file_name_of, is_markdown_path, is_sorted_forest, is_untitled_name,
    sort_entries, Entry,
};
pub use links::{rewrite_relative_links, LinkRewrite};
pub use mutation::{
    contains, find, insert, is_directory, move_entry, rebase_entry, remove, rename,
    update_metadata, MetadataPatch,
};
pub use naming::{resolve_unique_path, NameError, NameOptions, SuffixStyle, MAX_NAME_ATTEMPTS};
pub use path_set::{
    filter_to_existing_directories, filter_to_workspace, is_within, prune_removed, rebase_path,
    translate_on_rename, PathSet,
};

/// Errors raised while reading the directory tree.
/// 讀取目錄樹時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
