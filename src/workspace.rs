//! Workspace root discovery
//!
//! The workspace root is the nearest ancestor of the starting directory
//! that contains the bookmark file, falling back to the starting directory
//! itself. Relative bookmark paths resolve against this root, and the root
//! decides which bookmark file a session operates on.

use std::path::{Path, PathBuf};

/// Walk upward from `start` looking for a directory containing `file_name`.
///
/// `start` itself is checked first. Returns `start` unchanged when no
/// ancestor has the file (a fresh workspace that has no bookmarks yet).
pub fn discover_root(start: &Path, file_name: &str) -> PathBuf {
    for dir in start.ancestors() {
        if dir.join(file_name).is_file() {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

/// Discover the root starting from the process working directory.
pub fn discover_root_from_cwd(file_name: &str) -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => discover_root(&cwd, file_name),
        Err(err) => {
            tracing::warn!("could not determine working directory: {err}");
            PathBuf::from(".")
        }
    }
}
