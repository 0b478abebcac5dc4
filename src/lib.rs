//! Linemark LSP - bookmarks in a plain text file that survive editing
//!
//! This crate keeps a human-editable bookmark file (`name: path:line`
//! entries) consistent while the referenced source files are edited. The
//! core is a lenient line-oriented parser, a line-adjustment algebra for
//! buffer edits, an mtime-cached store, and a debounced change tracker; a
//! `tower-lsp` backend feeds editor events into them.

pub mod adjust;
pub mod backend;
pub mod config;
pub mod format;
pub mod fs;
pub mod store;
pub mod tracker;
pub mod workspace;

pub use adjust::{compute_adjustments, merge_adjustments};
pub use format::{
    Bookmark, find_bookmark_file_line, find_header_end, parse_file,
    rewrite_trailing_line_number, validate_name,
};
pub use store::BookmarkStore;
pub use tracker::ChangeTracker;
